// src/error.rs
//! Error types for each pipeline seam.
//!
//! Components return these typed errors so the orchestrator can tell a
//! transient failure from a validation failure from a fatal one. The binaries
//! and the HTTP trigger wrap them in `anyhow` at the edge.

use crate::cancel::Cancelled;

/// Retention store failures. Always treated as transient by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Out-of-contract content in a scoring response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("relevance_score must be between 0 and 100, got {0}")]
    ScoreOutOfRange(i64),

    #[error("summary must be between 50 and 200 characters, got {0}")]
    SummaryLength(usize),

    #[error("matching_topics must not be empty when relevance_score > 0")]
    MissingTopics,

    #[error("matching topic {0:?} is not a configured interest")]
    UnknownTopic(String),
}

/// Reasoning-service failures. Every variant skips the item; none is retried.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("scoring cancelled")]
    Cancelled,

    #[error("request to reasoning service failed: {0}")]
    Transport(String),

    #[error("reasoning service error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("no candidates in response")]
    NoCandidates,

    #[error("no parts in candidate content")]
    NoParts,

    #[error("unexpected finish reason: {0}")]
    FinishReason(String),

    #[error("failed to parse model output: {0}")]
    Parse(String),

    #[error("invalid evaluation result: {0}")]
    Invalid(#[from] ValidationError),
}

impl From<Cancelled> for ScoreError {
    fn from(_: Cancelled) -> Self {
        ScoreError::Cancelled
    }
}

/// Webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("too many embeds: {count} (max {max})")]
    TooManyCards { count: usize, max: usize },

    #[error("webhook API error (HTTP {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
        retry_after: Option<f64>,
    },

    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("rate limited {waits} times in a row, giving up")]
    RateLimitExceeded { waits: u32 },

    #[error("failed after {retries} retries: {last}")]
    Exhausted {
        retries: u32,
        #[source]
        last: Box<NotifyError>,
    },

    #[error("delivery cancelled")]
    Cancelled,
}

impl NotifyError {
    /// 400 and 404 mean the payload or the endpoint is wrong; retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NotifyError::Api { status, .. } if *status == 400 || *status == 404)
    }
}

impl From<Cancelled> for NotifyError {
    fn from(_: Cancelled) -> Self {
        NotifyError::Cancelled
    }
}

/// Feed retrieval and parsing failures. Scoped to a single source.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed fetch cancelled")]
    Cancelled,

    #[error("feed request failed: {0}")]
    Http(String),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("failed to parse feed: {0}")]
    Parse(String),
}

impl From<Cancelled> for FeedError {
    fn from(_: Cancelled) -> Self {
        FeedError::Cancelled
    }
}

/// Article download and body extraction failures. Scoped to a single item.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("article fetch cancelled")]
    Cancelled,

    #[error("article request failed: {0}")]
    Fetch(String),

    #[error("article returned HTTP {0}")]
    Status(u16),

    #[error("article body is empty")]
    EmptyBody,

    #[error("article body too large: {0} bytes")]
    TooLarge(usize),

    #[error("article text too short: {len} characters (min {min})")]
    TooShort { len: usize, min: usize },
}

impl From<Cancelled> for ExtractError {
    fn from(_: Cancelled) -> Self {
        ExtractError::Cancelled
    }
}

/// Configuration and secret loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch config from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing required secret: {0}")]
    MissingSecret(&'static str),
}

/// Invalid input to the ranker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    #[error("max batch size must not be negative, got {0}")]
    NegativeMax(i64),
}

/// Run-level failures. Any of these aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("too many retention store errors ({errors}), aborting run")]
    StoreBudgetExceeded { errors: usize },

    #[error("delivery failed: {0}")]
    Delivery(#[from] NotifyError),

    #[error("run cancelled")]
    Cancelled,
}

impl From<Cancelled> for RunError {
    fn from(_: Cancelled) -> Self {
        RunError::Cancelled
    }
}
