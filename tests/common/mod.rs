// tests/common/mod.rs
//
// Shared stubs for pipeline/router tests: a scripted model, canned article
// content, a recording notifier and a store that can be told to fail.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use feed_curator::cancel::CancelToken;
use feed_curator::error::{ExtractError, NotifyError, ScoreError, StoreError};
use feed_curator::extract::ContentSource;
use feed_curator::model::{CandidateItem, ExtractedContent, RankedBatch};
use feed_curator::notify::Notifier;
use feed_curator::score::ModelProvider;
use feed_curator::store::{ManualClock, MemoryStore, RecordKind, RecordMeta, RetentionStore};

pub const OVERVIEW_MARKER: &str = "header of a daily reading digest";

pub fn summary() -> String {
    "A practical walkthrough with runnable code and measured results for production use.".to_string()
}

pub fn eval_json(score: i64, topics: &[&str]) -> String {
    serde_json::json!({
        "relevance_score": score,
        "matching_topics": topics,
        "summary": summary(),
        "reasoning": "scripted"
    })
    .to_string()
}

pub fn rss(items: &[(&str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, url)| format!("<item><title>{title}</title><link>{url}</link></item>"))
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>{body}</channel></rss>"#)
}

pub fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap())
}

pub fn memory_store(clock: &ManualClock) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Arc::new(clock.clone())))
}

/// Answers by the article title found in the prompt.
pub struct ScriptedModel {
    by_title: HashMap<String, Result<String, String>>,
    overview: Mutex<Option<Result<String, String>>>,
    pub calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            by_title: HashMap::new(),
            overview: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answer(mut self, title: &str, text: String) -> Self {
        self.by_title.insert(title.to_string(), Ok(text));
        self
    }

    pub fn fail(mut self, title: &str, why: &str) -> Self {
        self.by_title.insert(title.to_string(), Err(why.to_string()));
        self
    }

    pub fn overview(self, text: Result<String, String>) -> Self {
        *self.overview.lock() = Some(text);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn generate(&self, prompt: &str, cancel: &CancelToken) -> Result<String, ScoreError> {
        if cancel.is_cancelled() {
            return Err(ScoreError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains(OVERVIEW_MARKER) {
            return match self.overview.lock().clone() {
                Some(Ok(t)) => Ok(t),
                Some(Err(e)) => Err(ScoreError::Transport(e)),
                None => Err(ScoreError::Transport("no overview scripted".into())),
            };
        }
        for (title, reply) in &self.by_title {
            if prompt.contains(&format!("Article title: {title}\n")) {
                return reply.clone().map_err(ScoreError::Transport);
            }
        }
        Err(ScoreError::Transport("unscripted prompt".into()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Long-enough body for every URL except the ones marked broken.
pub struct StubContent {
    broken: Vec<String>,
}

impl StubContent {
    pub fn ok() -> Self {
        Self { broken: Vec::new() }
    }

    pub fn broken(urls: &[&str]) -> Self {
        Self {
            broken: urls.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ContentSource for StubContent {
    async fn extract(
        &self,
        item: &CandidateItem,
        cancel: &CancelToken,
    ) -> Result<ExtractedContent, ExtractError> {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        if self.broken.contains(&item.url) {
            return Err(ExtractError::Status(500));
        }
        Ok(ExtractedContent {
            title: None,
            text: "Body text about the topic. ".repeat(20),
        })
    }
}

/// Records batches; optionally fails.
pub struct RecordingNotifier {
    pub batches: Mutex<Vec<(RankedBatch, String)>>,
    fail_with: Mutex<Option<NotifyError>>,
}

impl RecordingNotifier {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        })
    }

    pub fn failing(e: NotifyError) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(e)),
        })
    }

    pub fn sent(&self) -> usize {
        self.batches.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(
        &self,
        batch: &RankedBatch,
        label: &str,
        _cancel: &CancelToken,
    ) -> Result<String, NotifyError> {
        if let Some(e) = self.fail_with.lock().take() {
            return Err(e);
        }
        self.batches.lock().push((batch.clone(), label.to_string()));
        Ok("msg-1".to_string())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Wraps a store; read errors for the first `fail_reads` calls (or all, with `usize::MAX`).
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    fail_reads: usize,
    reads: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, fail_reads: usize) -> Self {
        Self {
            inner,
            fail_reads,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RetentionStore for FlakyStore {
    async fn exists(&self, kind: RecordKind, url: &str) -> Result<bool, StoreError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_reads {
            return Err(StoreError::Unavailable("injected".into()));
        }
        self.inner.exists(kind, url).await
    }

    async fn save(&self, url: &str, meta: RecordMeta) -> Result<(), StoreError> {
        self.inner.save(url, meta).await
    }
}
