// src/score/mod.rs
//! Relevance scoring: prompt the reasoning service, treat its answer as
//! untrusted text, validate it, and derive relevance locally.
//!
//! Order per item:
//! 1) build the prompt from title, truncated body and topic list
//! 2) call the model (rate-limited inside the provider)
//! 3) strip an optional code fence and parse the fixed-schema object
//! 4) validate ranges, summary length and topic membership
//! 5) re-derive `is_relevant` from score and threshold

pub mod gemini;
pub mod limiter;

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{ScoreError, ValidationError};
use crate::model::{CandidateItem, ExtractedContent, Overview, RelevanceAssessment, ScoredItem};
use crate::store::RejectReason;
use crate::text::{rune_len, truncate_runes};

pub use gemini::{GeminiClient, ModelProvider};
pub use limiter::{IntervalLimiter, RateLimiter, Unlimited};

pub const MIN_SUMMARY_CHARS: usize = 50;
pub const MAX_SUMMARY_CHARS: usize = 200;
pub const MAX_SCORE: i64 = 100;

/// Body text sent to the model is capped to stay well inside the input budget.
pub const MAX_PROMPT_CONTENT_CHARS: usize = 10_000;

/// Raw object the model is asked to return.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvaluation {
    pub relevance_score: i64,
    #[serde(default)]
    pub matching_topics: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub reasoning: String,
}

/// Remove a surrounding ```` ```json ```` / ```` ``` ```` fence if present.
pub fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    if !(t.starts_with("```") && t.ends_with("```") && t.len() >= 6) {
        return t;
    }
    let inner = &t[3..t.len() - 3];
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

pub fn parse_evaluation(text: &str) -> Result<RawEvaluation, ScoreError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| ScoreError::Parse(e.to_string()))
}

/// Check the parsed object against the scoring contract and map the topics
/// onto the configured spelling. Topic matching ignores case and surrounding
/// whitespace; duplicates collapse.
pub fn validate(raw: &RawEvaluation, topics: &[String]) -> Result<Vec<String>, ValidationError> {
    if !(0..=MAX_SCORE).contains(&raw.relevance_score) {
        return Err(ValidationError::ScoreOutOfRange(raw.relevance_score));
    }

    let summary_len = rune_len(&raw.summary);
    if !(MIN_SUMMARY_CHARS..=MAX_SUMMARY_CHARS).contains(&summary_len) {
        return Err(ValidationError::SummaryLength(summary_len));
    }

    if raw.relevance_score > 0 && raw.matching_topics.is_empty() {
        return Err(ValidationError::MissingTopics);
    }

    let mut canonical: Vec<String> = Vec::with_capacity(raw.matching_topics.len());
    for t in &raw.matching_topics {
        let wanted = t.trim();
        let Some(known) = topics.iter().find(|k| k.trim().eq_ignore_ascii_case(wanted)) else {
            return Err(ValidationError::UnknownTopic(t.clone()));
        };
        if !canonical.contains(known) {
            canonical.push(known.clone());
        }
    }
    Ok(canonical)
}

/// A score of zero is a hard non-match regardless of the threshold.
pub fn is_relevant(score: u8, min_score: u8) -> bool {
    score > 0 && score >= min_score
}

/// Persisted reason for an item that did not make the cut.
pub fn classify_rejection(matching_topics: &[String]) -> RejectReason {
    if matching_topics.is_empty() {
        RejectReason::NoTopicMatch
    } else {
        RejectReason::LowRelevance
    }
}

impl RelevanceAssessment {
    /// `None` when the item is relevant.
    pub fn rejection_reason(&self) -> Option<RejectReason> {
        (!self.is_relevant).then(|| classify_rejection(&self.matching_topics))
    }
}

/// Turn raw model text into a validated assessment.
pub fn assess(
    url: &str,
    model_text: &str,
    topics: &[String],
    min_score: u8,
) -> Result<RelevanceAssessment, ScoreError> {
    let raw = parse_evaluation(model_text)?;
    let matching_topics = validate(&raw, topics)?;
    // validate() bounds the score to 0..=100
    let score = u8::try_from(raw.relevance_score)
        .map_err(|_| ValidationError::ScoreOutOfRange(raw.relevance_score))?;
    Ok(RelevanceAssessment {
        url: url.to_string(),
        score,
        matching_topics,
        summary: raw.summary,
        reasoning: raw.reasoning,
        is_relevant: is_relevant(score, min_score),
        evaluated_at: Utc::now(),
    })
}

pub struct Scorer {
    model: Arc<dyn ModelProvider>,
    priority_topics: Vec<String>,
}

impl Scorer {
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            model,
            priority_topics: Vec::new(),
        }
    }

    /// Topics the model should weigh more heavily.
    pub fn with_priority_topics(mut self, topics: Vec<String>) -> Self {
        self.priority_topics = topics;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.model.name()
    }

    /// Score one item against `topics`. Any error means the item is skipped.
    pub async fn evaluate(
        &self,
        item: &CandidateItem,
        content: &ExtractedContent,
        topics: &[String],
        min_score: u8,
        cancel: &CancelToken,
    ) -> Result<RelevanceAssessment, ScoreError> {
        let title = content.title.as_deref().unwrap_or(&item.title);
        let prompt = build_evaluation_prompt(title, &content.text, topics, &self.priority_topics);
        let text = self.model.generate(&prompt, cancel).await?;
        let out = assess(&item.url, &text, topics, min_score);
        match &out {
            Ok(a) => {
                counter!("curator_scored_total").increment(1);
                tracing::debug!(url = %item.url, score = a.score, relevant = a.is_relevant, "scored");
            }
            Err(e) => tracing::debug!(url = %item.url, error = %e, "score rejected"),
        }
        out
    }

    /// Ask for a one-card digest of the ranked items.
    pub async fn summarize_batch(
        &self,
        items: &[ScoredItem],
        cancel: &CancelToken,
    ) -> Result<Overview, ScoreError> {
        let prompt = build_overview_prompt(items);
        let text = self.model.generate(&prompt, cancel).await?;
        parse_overview(&text, items.len())
    }
}

/// Parse and sanity-check the overview object.
pub fn parse_overview(text: &str, item_count: usize) -> Result<Overview, ScoreError> {
    let mut ov: Overview =
        serde_json::from_str(strip_code_fence(text)).map_err(|e| ScoreError::Parse(e.to_string()))?;
    ov.overall_summary = ov.overall_summary.trim().to_string();
    if ov.overall_summary.is_empty() {
        return Err(ScoreError::Parse("overall_summary is empty".into()));
    }
    ov.recommendations.retain(|r| !r.trim().is_empty());
    ov.recommendations.truncate(item_count);
    Ok(ov)
}

fn topics_json(topics: &[String]) -> String {
    serde_json::to_string(topics).unwrap_or_else(|_| "[]".to_string())
}

pub fn build_evaluation_prompt(
    title: &str,
    body: &str,
    topics: &[String],
    priority_topics: &[String],
) -> String {
    let topics = topics_json(topics);
    let body = truncate_runes(body, MAX_PROMPT_CONTENT_CHARS);
    let priority = if priority_topics.is_empty() {
        String::new()
    } else {
        format!(
            "\nGive extra weight to these high-priority topics: {}\n",
            topics_json(priority_topics)
        )
    };
    format!(
        r#"You are an expert curator of technical articles. Rate how relevant the article below is to these topics: {topics}
{priority}
Article title: {title}
Article body: {body}

Reply with JSON only:
{{
  "relevance_score": <integer 0-100>,
  "matching_topics": [<topic names from the list above>],
  "summary": "<summary of 50-200 characters>",
  "reasoning": "<one or two sentences explaining the score>"
}}

Scoring (additive, max 100):
- Topic match (max 30): several topics covered with concrete implementation detail scores highest; a passing mention scores 5; no mention scores 0.
- Specificity (max 30): real code, commands or configuration score highest; abstract description only scores 5.
- Practical value (max 25): directly applicable to real projects scores highest; generic news scores 5.
- Depth (max 15): comprehensive write-ups (2000+ characters of substance) score highest; short announcements score 3.

Return 0 when the article is mass-produced filler without concrete experience or implementation, and say so in "reasoning".

Rules:
- "matching_topics" may only contain names from {topics}. Never invent topics.
- If relevance_score is greater than 0, "matching_topics" must not be empty.
- The summary must be 50-200 characters and state the main point."#
    )
}

#[derive(Serialize)]
struct OverviewEntry<'a> {
    title: &'a str,
    summary: &'a str,
    relevance_score: u8,
    matching_topics: &'a [String],
}

pub fn build_overview_prompt(items: &[ScoredItem]) -> String {
    let entries: Vec<OverviewEntry<'_>> = items
        .iter()
        .map(|s| OverviewEntry {
            title: &s.title,
            summary: &s.assessment.summary,
            relevance_score: s.assessment.score,
            matching_topics: &s.assessment.matching_topics,
        })
        .collect();
    let list = serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You are writing the header of a daily reading digest. These {n} articles were selected, best first:
{list}

Reply with JSON only:
{{
  "overall_summary": "<2-3 sentences on today's common themes>",
  "must_read": "<the single article to read first and why>",
  "recommendations": [<one short line per article, in the order given>]
}}"#,
        n = items.len()
    )
}
