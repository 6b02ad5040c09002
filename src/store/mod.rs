// src/store/mod.rs
//! Retention store: remembers which article URLs were already notified or
//! rejected, so later runs skip them.
//!
//! - Records are addressed by a SHA-256 fingerprint of the raw URL, so query
//!   strings, length, and encoding never affect the key.
//! - Records are never deleted. A record older than [`RETENTION_DAYS`] is
//!   reported as absent by `exists`; expiry is decided at read time.
//! - There is no atomic check-and-set. Runs must not overlap.

pub mod file;
pub mod memory;

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Records older than this are treated as absent.
pub const RETENTION_DAYS: i64 = 30;

pub fn retention_window() -> Duration {
    Duration::days(RETENTION_DAYS)
}

/// Which record collection a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Notified,
    Rejected,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Notified => "notified",
            RecordKind::Rejected => "rejected",
        }
    }
}

/// Why an item was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowRelevance,
    NoTopicMatch,
    ExtractionFailed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::LowRelevance => "low_relevance",
            RejectReason::NoTopicMatch => "no_topic_match",
            RejectReason::ExtractionFailed => "extraction_failed",
        }
    }
}

/// Kind-specific payload of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordMeta {
    Notified {
        delivery_id: String,
        title: String,
        score: u8,
    },
    Rejected {
        reason: RejectReason,
        score: Option<u8>,
    },
}

impl RecordMeta {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordMeta::Notified { .. } => RecordKind::Notified,
            RecordMeta::Rejected { .. } => RecordKind::Rejected,
        }
    }
}

/// Persisted form of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl RetentionRecord {
    /// True while the record is inside the retention window at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) <= retention_window()
    }
}

/// Storage contract used by the pipeline.
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Whether a live record of `kind` exists for `url`.
    async fn exists(&self, kind: RecordKind, url: &str) -> Result<bool, StoreError>;

    /// Write (or overwrite) the record for `url`. The kind comes from `meta`.
    async fn save(&self, url: &str, meta: RecordMeta) -> Result<(), StoreError>;
}

/// Fixed-length storage key for a URL: lowercase hex SHA-256 (64 chars).
pub fn fingerprint(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut g = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *g += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut g = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *g = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}
