// src/pipeline.rs
//! One curation run, end to end.
//!
//! 1) collect items from every feed (failing feeds are skipped)
//! 2) drop items already notified or rejected (store errors fail open, up to a budget)
//! 3) extract and score each remaining item, recording rejections
//! 4) rank, optionally summarize, deliver as one message
//! 5) record every delivered item as notified
//!
//! Per-item and per-source failures are contained. Store-budget exhaustion,
//! delivery failure and cancellation abort the run.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};

use crate::cancel::CancelToken;
use crate::error::{ExtractError, NotifyError, RunError, ScoreError};
use crate::extract::ContentSource;
use crate::ingest::{collect_items, FeedProvider};
use crate::model::{CandidateItem, RankedBatch, ScoredItem};
use crate::notify::format::MAX_EMBEDS;
use crate::notify::Notifier;
use crate::rank::rank;
use crate::score::Scorer;
use crate::store::{RecordKind, RecordMeta, RejectReason, RetentionStore};

/// Store read errors tolerated per run. The run aborts when the count reaches it.
pub const STORE_ERROR_BUDGET: usize = 10;

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Interest topics in configured spelling.
    pub topics: Vec<String>,
    pub min_score: u8,
    /// Items per message before the protocol cap.
    pub max_items: usize,
    /// Items sent to the scorer per run; 0 means no cap.
    pub max_evaluations: usize,
    pub store_error_budget: usize,
    pub with_overview: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            min_score: 60,
            max_items: 5,
            max_evaluations: 0,
            store_error_budget: STORE_ERROR_BUDGET,
            with_overview: true,
        }
    }
}

/// How a run ended when it did not abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NoItemsFound,
    NoNewItems,
    NoRelevantItems,
    Delivered { count: usize, delivery_id: String },
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::NoItemsFound => "no_items_found",
            RunOutcome::NoNewItems => "no_new_items",
            RunOutcome::NoRelevantItems => "no_relevant_items",
            RunOutcome::Delivered { .. } => "delivered",
        }
    }

    /// Operator-facing one-liner.
    pub fn message(&self) -> String {
        match self {
            RunOutcome::NoItemsFound => "no items found in any feed".to_string(),
            RunOutcome::NoNewItems => "no new items since the last run".to_string(),
            RunOutcome::NoRelevantItems => "no relevant items this run".to_string(),
            RunOutcome::Delivered { count, delivery_id } => {
                format!("delivered {count} item(s), message id {delivery_id}")
            }
        }
    }
}

fn run_error_label(e: &RunError) -> &'static str {
    match e {
        RunError::StoreBudgetExceeded { .. } => "store_budget_exceeded",
        RunError::Delivery(_) => "delivery_failed",
        RunError::Cancelled => "cancelled",
    }
}

pub struct Curator {
    feeds: Vec<Box<dyn FeedProvider>>,
    content: Arc<dyn ContentSource>,
    scorer: Scorer,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn RetentionStore>,
    settings: RunSettings,
}

impl Curator {
    pub fn new(
        feeds: Vec<Box<dyn FeedProvider>>,
        content: Arc<dyn ContentSource>,
        scorer: Scorer,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn RetentionStore>,
        settings: RunSettings,
    ) -> Self {
        Self {
            feeds,
            content,
            scorer,
            notifier,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run once. `label` goes into the message header (usually the date).
    pub async fn run_once(&self, label: &str, cancel: &CancelToken) -> Result<RunOutcome, RunError> {
        crate::metrics::ensure_metrics_described();
        let t0 = Instant::now();
        let result = self.run_inner(label, cancel).await;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("curator_run_duration_ms").record(ms);

        let outcome = match &result {
            Ok(o) => o.as_str(),
            Err(e) => run_error_label(e),
        };
        counter!("curator_runs_total", "outcome" => outcome).increment(1);
        match &result {
            Ok(o) => tracing::info!(outcome, elapsed_ms = ms as u64, "{}", o.message()),
            Err(e) => tracing::error!(outcome, elapsed_ms = ms as u64, error = %e, "run aborted"),
        }
        result
    }

    async fn run_inner(&self, label: &str, cancel: &CancelToken) -> Result<RunOutcome, RunError> {
        // 1) Collect.
        let items = collect_items(&self.feeds, cancel).await?;
        if items.is_empty() {
            return Ok(RunOutcome::NoItemsFound);
        }

        // 2) Dedup against the store.
        let fresh = self.filter_seen(items, cancel).await?;
        if fresh.is_empty() {
            return Ok(RunOutcome::NoNewItems);
        }

        // 3) Extract + score.
        let scored = self.evaluate_all(fresh, cancel).await?;
        if scored.is_empty() {
            return Ok(RunOutcome::NoRelevantItems);
        }

        // 4) Rank.
        let limit = self.settings.max_items.min(MAX_EMBEDS);
        let ranked = rank(scored, limit);
        tracing::info!(selected = ranked.len(), limit, "ranked");

        // 5) Overview, only when a card is left for it.
        let overview = if self.settings.with_overview && ranked.len() < MAX_EMBEDS {
            match self.scorer.summarize_batch(&ranked, cancel).await {
                Ok(ov) => Some(ov),
                Err(ScoreError::Cancelled) => return Err(RunError::Cancelled),
                Err(e) => {
                    tracing::warn!(error = %e, "overview failed, delivering without it");
                    None
                }
            }
        } else {
            None
        };
        let batch = RankedBatch::new(ranked).with_overview(overview);

        // 6) Deliver.
        let delivery_id = match self.notifier.deliver(&batch, label, cancel).await {
            Ok(id) => id,
            Err(NotifyError::Cancelled) => return Err(RunError::Cancelled),
            Err(e) => return Err(RunError::Delivery(e)),
        };
        counter!("curator_delivered_items_total").increment(batch.items.len() as u64);

        // 7) Record. Failures here only cost a possible repeat next run.
        for s in &batch.items {
            let meta = RecordMeta::Notified {
                delivery_id: delivery_id.clone(),
                title: s.title.clone(),
                score: s.assessment.score,
            };
            if let Err(e) = self.store.save(&s.item.url, meta).await {
                tracing::error!(url = %s.item.url, error = %e, "failed to record notified item");
            }
        }

        Ok(RunOutcome::Delivered {
            count: batch.items.len(),
            delivery_id,
        })
    }

    /// Keep items with no live record. A store error lets the item through
    /// and counts against the budget.
    async fn filter_seen(
        &self,
        items: Vec<CandidateItem>,
        cancel: &CancelToken,
    ) -> Result<Vec<CandidateItem>, RunError> {
        let total = items.len();
        let mut fresh = Vec::with_capacity(total);
        let mut errors = 0usize;
        let mut skipped_notified = 0usize;
        let mut skipped_rejected = 0usize;

        'items: for item in items {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            for kind in [RecordKind::Notified, RecordKind::Rejected] {
                match self.store.exists(kind, &item.url).await {
                    Ok(false) => {}
                    Ok(true) => {
                        match kind {
                            RecordKind::Notified => skipped_notified += 1,
                            RecordKind::Rejected => skipped_rejected += 1,
                        }
                        counter!("curator_dedup_skipped_total", "kind" => kind.as_str()).increment(1);
                        continue 'items;
                    }
                    Err(e) => {
                        errors += 1;
                        counter!("curator_store_errors_total").increment(1);
                        tracing::error!(url = %item.url, kind = kind.as_str(), error = %e, errors, "store check failed");
                        if errors >= self.settings.store_error_budget {
                            return Err(RunError::StoreBudgetExceeded { errors });
                        }
                        fresh.push(item);
                        continue 'items;
                    }
                }
            }
            fresh.push(item);
        }

        tracing::info!(
            total,
            fresh = fresh.len(),
            skipped_notified,
            skipped_rejected,
            store_errors = errors,
            "dedup finished"
        );
        Ok(fresh)
    }

    async fn evaluate_all(
        &self,
        items: Vec<CandidateItem>,
        cancel: &CancelToken,
    ) -> Result<Vec<ScoredItem>, RunError> {
        let cap = match self.settings.max_evaluations {
            0 => usize::MAX,
            n => n,
        };
        if items.len() > cap {
            tracing::info!(cap, available = items.len(), "evaluation cap applied");
        }

        let mut scored = Vec::new();
        for item in items.into_iter().take(cap) {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            let content = match self.content.extract(&item, cancel).await {
                Ok(c) => c,
                Err(ExtractError::Cancelled) => return Err(RunError::Cancelled),
                Err(e) => {
                    tracing::warn!(url = %item.url, error = %e, "extraction failed");
                    self.reject(&item.url, RejectReason::ExtractionFailed, None).await;
                    continue;
                }
            };

            let assessment = match self
                .scorer
                .evaluate(&item, &content, &self.settings.topics, self.settings.min_score, cancel)
                .await
            {
                Ok(a) => a,
                Err(ScoreError::Cancelled) => return Err(RunError::Cancelled),
                Err(e) => {
                    tracing::warn!(url = %item.url, error = %e, "scoring failed, skipping");
                    continue;
                }
            };

            tracing::info!(
                url = %item.url,
                score = assessment.score,
                relevant = assessment.is_relevant,
                "evaluated"
            );
            if let Some(reason) = assessment.rejection_reason() {
                self.reject(&item.url, reason, Some(assessment.score)).await;
                continue;
            }

            let title = content.title.unwrap_or_else(|| item.title.clone());
            scored.push(ScoredItem {
                item,
                title,
                assessment,
            });
        }
        Ok(scored)
    }

    async fn reject(&self, url: &str, reason: RejectReason, score: Option<u8>) {
        counter!("curator_rejected_total", "reason" => reason.as_str()).increment(1);
        if let Err(e) = self.store.save(url, RecordMeta::Rejected { reason, score }).await {
            tracing::error!(url, reason = reason.as_str(), error = %e, "failed to record rejection");
        }
    }
}
