// src/score/gemini.rs
//! Gemini `generateContent` client behind the [`ModelProvider`] seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::limiter::RateLimiter;
use crate::cancel::CancelToken;
use crate::error::ScoreError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Low temperature keeps scores consistent between runs.
pub const TEMPERATURE: f32 = 0.3;
pub const MAX_OUTPUT_TOKENS: u32 = 500;

/// Text-in, text-out model call. Separated so tests can script responses.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send `prompt`, return the first candidate's text.
    async fn generate(&self, prompt: &str, cancel: &CancelToken) -> Result<String, ScoreError>;
    fn name(&self) -> &'static str;
}

// ------------------------------------------------------------
// Wire types
// ------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest<'a> {
    pub contents: Vec<Content<'a>>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct Content<'a> {
    pub role: &'a str,
    pub parts: Vec<PartOut<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PartOut<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub response_mime_type: &'static str,
}

impl<'a> GenerateRequest<'a> {
    pub fn user_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![PartOut { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: "application/json",
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: CandidateContent,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<PartIn>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartIn {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// First candidate's first text part. A finish reason other than `STOP`
/// means the output was cut off or filtered.
pub fn first_candidate_text(resp: GenerateResponse) -> Result<String, ScoreError> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or(ScoreError::NoCandidates)?;
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            return Err(ScoreError::FinishReason(reason.to_string()));
        }
    }
    candidate
        .content
        .parts
        .into_iter()
        .next()
        .map(|p| p.text)
        .ok_or(ScoreError::NoParts)
}

// ------------------------------------------------------------
// HTTP client
// ------------------------------------------------------------

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    limiter: Arc<dyn RateLimiter>,
}

impl GeminiClient {
    pub fn new(api_key: String, limiter: Arc<dyn RateLimiter>) -> Result<Self, ScoreError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("feed-curator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            endpoint: format!("{DEFAULT_BASE_URL}/{DEFAULT_MODEL}:generateContent"),
            limiter,
        })
    }

    /// Point at another model or a local stub server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ModelProvider for GeminiClient {
    async fn generate(&self, prompt: &str, cancel: &CancelToken) -> Result<String, ScoreError> {
        // 1) Wait for a request slot.
        self.limiter.acquire(cancel).await?;

        // 2) Call.
        let req = GenerateRequest::user_prompt(prompt);
        let resp = cancel
            .run(
                self.http
                    .post(&self.endpoint)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&req)
                    .send(),
            )
            .await?
            .map_err(|e| ScoreError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = cancel
            .run(resp.text())
            .await?
            .map_err(|e| ScoreError::Transport(e.to_string()))?;

        // 3) Error envelope.
        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(env) => format!("{} - {}", env.error.status, env.error.message),
                Err(_) => body.chars().take(200).collect(),
            };
            return Err(ScoreError::Http {
                status: status.as_u16(),
                message,
            });
        }

        // 4) First candidate text.
        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| ScoreError::Parse(e.to_string()))?;
        first_candidate_text(parsed)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
