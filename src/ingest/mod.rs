// src/ingest/mod.rs
//! Feed collection: pull every configured source, isolate failures per
//! source, and drop in-run duplicate URLs.

pub mod feed;

use std::collections::HashSet;

use async_trait::async_trait;
use metrics::counter;

use crate::cancel::{CancelToken, Cancelled};
use crate::error::FeedError;
use crate::model::CandidateItem;

pub use feed::{parse_feed, FixtureFeed, HttpFeed};

#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch_items(&self, cancel: &CancelToken) -> Result<Vec<CandidateItem>, FeedError>;
    fn name(&self) -> &str;
}

/// Keep the first occurrence of each URL. Returns the number dropped.
pub fn dedup_by_url(items: &mut Vec<CandidateItem>) -> usize {
    let before = items.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    items.retain(|it| seen.insert(it.url.clone()));
    before - items.len()
}

/// Fetch from every provider in order. A failing source is logged and
/// skipped; only cancellation stops collection.
pub async fn collect_items(
    providers: &[Box<dyn FeedProvider>],
    cancel: &CancelToken,
) -> Result<Vec<CandidateItem>, Cancelled> {
    let mut all = Vec::new();
    for p in providers {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        match p.fetch_items(cancel).await {
            Ok(mut v) => {
                tracing::info!(source = p.name(), items = v.len(), "feed fetched");
                all.append(&mut v);
            }
            Err(FeedError::Cancelled) => return Err(Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, source = p.name(), "feed error, skipping source");
                counter!("curator_feed_errors_total").increment(1);
            }
        }
    }

    let dropped = dedup_by_url(&mut all);
    if dropped > 0 {
        tracing::debug!(dropped, "duplicate urls across feeds");
    }
    counter!("curator_items_fetched_total").increment(all.len() as u64);
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(url: &str, source: &str) -> CandidateItem {
        let now = Utc::now();
        CandidateItem {
            title: url.into(),
            url: url.into(),
            source: source.into(),
            published_at: now,
            fetched_at: now,
        }
    }

    struct Static(&'static str, Result<Vec<CandidateItem>, &'static str>);

    #[async_trait]
    impl FeedProvider for Static {
        async fn fetch_items(&self, _: &CancelToken) -> Result<Vec<CandidateItem>, FeedError> {
            self.1.clone().map_err(|m| FeedError::Parse(m.to_string()))
        }
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn dedup_keeps_first() {
        let mut v = vec![item("u1", "A"), item("u2", "A"), item("u1", "B")];
        assert_eq!(dedup_by_url(&mut v), 1);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].source, "A");
    }

    #[tokio::test]
    async fn failing_source_does_not_stop_others() {
        let providers: Vec<Box<dyn FeedProvider>> = vec![
            Box::new(Static("broken", Err("bad xml"))),
            Box::new(Static("ok", Ok(vec![item("u1", "ok"), item("u2", "ok")]))),
        ];
        let out = collect_items(&providers, &CancelToken::new()).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let providers: Vec<Box<dyn FeedProvider>> =
            vec![Box::new(Static("ok", Ok(vec![item("u1", "ok")])))];
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(collect_items(&providers, &cancel).await, Err(Cancelled));
    }
}
