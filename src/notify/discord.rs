// src/notify/discord.rs
//! Discord webhook delivery.
//!
//! One batch is one POST. The send loop is an explicit state machine:
//!
//! ```text
//! Idle -> Sending -> Done
//!            |  429 + retry_after -> RateLimited -> Sending   (no attempt used)
//!            |  400 / 404         -> Failed
//!            |  other error       -> Backoff -> Sending        (attempt used)
//!            `  retries exhausted -> Failed
//! ```
//!
//! Every wait races the run's cancel token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::Deserialize;

use super::format::{build_payload, WebhookPayload, MAX_EMBEDS};
use super::Notifier;
use crate::cancel::CancelToken;
use crate::error::NotifyError;
use crate::model::RankedBatch;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 10;
/// Longest single rate-limit wait honoured; larger `retry_after` values are clamped.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// Id returned when the webhook answers 204 or an empty body.
pub const NO_CONTENT_ID: &str = "success-no-content";
/// Id returned when a 2xx body carries no readable message id.
pub const UNPARSED_ID: &str = "success-unparsed-body";

/// Raw HTTP answer from the webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

/// One POST of a payload. Only network-level failures are errors here;
/// HTTP statuses are interpreted by the notifier.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        payload: &WebhookPayload,
        cancel: &CancelToken,
    ) -> Result<WebhookResponse, NotifyError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(
        &self,
        payload: &WebhookPayload,
        cancel: &CancelToken,
    ) -> Result<WebhookResponse, NotifyError> {
        let rsp = cancel
            .run(
                self.client
                    .post(&self.webhook)
                    .timeout(self.timeout)
                    .json(payload)
                    .send(),
            )
            .await?
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;
        let status = rsp.status().as_u16();
        let body = cancel
            .run(rsp.text())
            .await?
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;
        Ok(WebhookResponse { status, body })
    }
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
    retry_after: Option<f64>,
}

/// Turn a raw response into a message id or a typed API error.
pub fn interpret(resp: WebhookResponse) -> Result<String, NotifyError> {
    if resp.status == 200 || resp.status == 204 {
        if resp.status == 204 || resp.body.trim().is_empty() {
            return Ok(NO_CONTENT_ID.to_string());
        }
        return match serde_json::from_str::<MessageBody>(&resp.body) {
            Ok(m) if !m.id.is_empty() => Ok(m.id),
            Ok(_) | Err(_) => {
                // The message was accepted; resending would post it twice.
                tracing::warn!(status = resp.status, "webhook accepted message but body had no id");
                Ok(UNPARSED_ID.to_string())
            }
        };
    }

    match serde_json::from_str::<ErrorBody>(&resp.body) {
        Ok(e) => Err(NotifyError::Api {
            status: resp.status,
            code: e.code,
            message: e.message,
            retry_after: e.retry_after,
        }),
        Err(_) => Err(NotifyError::Api {
            status: resp.status,
            code: 0,
            message: resp.body.chars().take(200).collect(),
            retry_after: None,
        }),
    }
}

/// `retry_after` seconds as a wait, clamped to [`MAX_RATE_LIMIT_WAIT`].
fn rate_limit_wait(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_RATE_LIMIT_WAIT)
        .min(MAX_RATE_LIMIT_WAIT)
}

/// Delivery state. `Done` and `Failed` are terminal.
#[derive(Debug)]
pub enum DeliveryState {
    Idle,
    Sending,
    RateLimited(Duration),
    Backoff(Duration),
    Done(String),
    Failed(NotifyError),
}

impl DeliveryState {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryState::Idle => "idle",
            DeliveryState::Sending => "sending",
            DeliveryState::RateLimited(_) => "rate_limited",
            DeliveryState::Backoff(_) => "backoff",
            DeliveryState::Done(_) => "done",
            DeliveryState::Failed(_) => "failed",
        }
    }
}

/// What one delivery did, for logs and tests.
#[derive(Debug)]
pub struct DeliveryReport {
    pub outcome: Result<String, NotifyError>,
    /// POSTs actually issued, including rate-limited ones.
    pub sends: u32,
    pub rate_limit_waits: u32,
    pub backoffs: u32,
    /// State labels in visiting order, terminal state last.
    pub path: Vec<&'static str>,
}

pub struct DiscordNotifier {
    transport: Arc<dyn WebhookTransport>,
    max_retries: u32,
    backoff_base: Duration,
    max_rate_limit_waits: u32,
}

impl DiscordNotifier {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            transport,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
        }
    }

    pub fn from_webhook(webhook: String) -> Self {
        Self::new(Arc::new(HttpTransport::new(webhook)))
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_max_rate_limit_waits(mut self, waits: u32) -> Self {
        self.max_rate_limit_waits = waits;
        self
    }

    /// Wait before retry `n` (1-based): base, 2·base, 4·base, ...
    pub fn backoff_for(&self, n: u32) -> Duration {
        let shift = n.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << shift)
    }

    /// Drive the state machine for one payload.
    pub async fn send_payload(&self, payload: &WebhookPayload, cancel: &CancelToken) -> DeliveryReport {
        let mut state = DeliveryState::Idle;
        let mut path = Vec::new();
        let mut sends = 0u32;
        let mut failures = 0u32;
        let mut rate_limit_waits = 0u32;
        let mut consecutive_rate_limits = 0u32;
        let mut backoffs = 0u32;

        loop {
            path.push(state.label());
            state = match state {
                DeliveryState::Idle => DeliveryState::Sending,

                DeliveryState::Sending => {
                    sends += 1;
                    counter!("curator_delivery_attempts_total").increment(1);
                    let result = match self.transport.post(payload, cancel).await {
                        Ok(resp) => interpret(resp),
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(id) => DeliveryState::Done(id),
                        Err(NotifyError::Cancelled) => DeliveryState::Failed(NotifyError::Cancelled),
                        Err(NotifyError::Api {
                            status: 429,
                            retry_after: Some(secs),
                            ..
                        }) if secs.is_finite() && secs > 0.0 => {
                            consecutive_rate_limits += 1;
                            if consecutive_rate_limits > self.max_rate_limit_waits {
                                DeliveryState::Failed(NotifyError::RateLimitExceeded {
                                    waits: self.max_rate_limit_waits,
                                })
                            } else {
                                tracing::warn!(retry_after = secs, "webhook rate limited");
                                DeliveryState::RateLimited(rate_limit_wait(secs))
                            }
                        }
                        Err(e) if e.is_fatal() => {
                            tracing::error!(error = %e, "webhook rejected payload, not retrying");
                            DeliveryState::Failed(e)
                        }
                        Err(e) => {
                            consecutive_rate_limits = 0;
                            failures += 1;
                            if failures > self.max_retries {
                                DeliveryState::Failed(NotifyError::Exhausted {
                                    retries: self.max_retries,
                                    last: Box::new(e),
                                })
                            } else {
                                let wait = self.backoff_for(failures);
                                tracing::info!(
                                    attempt = failures,
                                    max_retries = self.max_retries,
                                    wait_ms = wait.as_millis() as u64,
                                    error = %e,
                                    "webhook send failed, backing off"
                                );
                                DeliveryState::Backoff(wait)
                            }
                        }
                    }
                }

                DeliveryState::RateLimited(wait) => {
                    rate_limit_waits += 1;
                    match cancel.sleep(wait).await {
                        Ok(()) => DeliveryState::Sending,
                        Err(c) => DeliveryState::Failed(c.into()),
                    }
                }

                DeliveryState::Backoff(wait) => {
                    backoffs += 1;
                    match cancel.sleep(wait).await {
                        Ok(()) => DeliveryState::Sending,
                        Err(c) => DeliveryState::Failed(c.into()),
                    }
                }

                DeliveryState::Done(id) => {
                    return DeliveryReport {
                        outcome: Ok(id),
                        sends,
                        rate_limit_waits,
                        backoffs,
                        path,
                    }
                }

                DeliveryState::Failed(e) => {
                    return DeliveryReport {
                        outcome: Err(e),
                        sends,
                        rate_limit_waits,
                        backoffs,
                        path,
                    }
                }
            };
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(
        &self,
        batch: &RankedBatch,
        label: &str,
        cancel: &CancelToken,
    ) -> Result<String, NotifyError> {
        // 1) Count check before anything goes on the wire.
        let cards = batch.card_count();
        if cards > MAX_EMBEDS {
            return Err(NotifyError::TooManyCards {
                count: cards,
                max: MAX_EMBEDS,
            });
        }

        // 2) Shape + send.
        let payload = build_payload(batch, label);
        let report = self.send_payload(&payload, cancel).await;
        tracing::info!(
            sends = report.sends,
            rate_limit_waits = report.rate_limit_waits,
            backoffs = report.backoffs,
            ok = report.outcome.is_ok(),
            "webhook delivery finished"
        );
        report.outcome
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}
