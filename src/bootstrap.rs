// src/bootstrap.rs
//! Wiring: configuration + secrets -> a ready [`Curator`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::config::{self, CuratorConfig, Secrets};
use crate::extract::{ArticleFetcher, Extractor, WebExtractor};
use crate::ingest::{FeedProvider, HttpFeed};
use crate::notify::{DiscordNotifier, LogNotifier, Notifier};
use crate::pipeline::{Curator, RunSettings};
use crate::score::{GeminiClient, IntervalLimiter, Scorer};
use crate::store::{FileStore, MemoryStore, RetentionStore};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Keep records in memory and log the message instead of posting it.
    pub dry_run: bool,
    /// Scorer calls per run; 0 means no cap.
    pub max_evaluations: usize,
}

pub struct Runtime {
    pub config: CuratorConfig,
    pub curator: Curator,
}

fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("feed-curator/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building http client")
}

impl Runtime {
    /// Load config from the default locations and secrets from the environment.
    pub async fn from_env(opts: BuildOptions) -> anyhow::Result<Self> {
        let client = http_client()?;
        let cfg = config::load_default(&client).await.context("loading curator config")?;

        let (gemini_key, webhook) = if opts.dry_run {
            (Secrets::gemini_key_from_env()?, None)
        } else {
            let s = Secrets::from_env()?;
            (s.gemini_api_key, Some(s.webhook_url))
        };

        // Safe diagnostics: counts and key lengths only
        info!(
            sources = cfg.enabled_sources().count(),
            interests = cfg.interests.len(),
            max_articles = cfg.notification.max_articles,
            min_score = cfg.notification.min_relevance_score,
            gemini_key_len = gemini_key.len(),
            webhook_len = webhook.as_ref().map(|w| w.len()).unwrap_or(0),
            dry_run = opts.dry_run,
            "curator config loaded"
        );

        let curator = build_curator(&cfg, client, gemini_key, webhook, &opts)?;
        Ok(Self { config: cfg, curator })
    }
}

/// Assemble the pipeline. `webhook == None` selects the log-only notifier.
pub fn build_curator(
    cfg: &CuratorConfig,
    client: reqwest::Client,
    gemini_key: String,
    webhook: Option<String>,
    opts: &BuildOptions,
) -> anyhow::Result<Curator> {
    let feeds: Vec<Box<dyn FeedProvider>> = cfg
        .enabled_sources()
        .map(|s| {
            Box::new(
                HttpFeed::new(s.name.clone(), s.url.clone(), client.clone())
                    .with_timeout(cfg.timeouts.feed_fetch()),
            ) as Box<dyn FeedProvider>
        })
        .collect();

    let content = Arc::new(WebExtractor::new(
        ArticleFetcher::new(client).with_timeout(cfg.timeouts.article_fetch()),
        Extractor::new(cfg.timeouts.min_text_len, cfg.timeouts.max_text_len),
    ));

    let model = GeminiClient::new(gemini_key, Arc::new(IntervalLimiter::per_minute_default()))
        .context("building gemini client")?;
    let scorer = Scorer::new(Arc::new(model)).with_priority_topics(cfg.high_priority_topics());

    let (notifier, store): (Arc<dyn Notifier>, Arc<dyn RetentionStore>) = match webhook {
        Some(url) if !opts.dry_run => (
            Arc::new(DiscordNotifier::from_webhook(url)),
            Arc::new(FileStore::with_system_clock(cfg.store_dir.clone())),
        ),
        _ => (Arc::new(LogNotifier), Arc::new(MemoryStore::default())),
    };

    let settings = RunSettings {
        topics: cfg.topic_names(),
        min_score: cfg.notification.min_relevance_score,
        max_items: cfg.batch_limit(),
        max_evaluations: opts.max_evaluations,
        ..RunSettings::default()
    };

    Ok(Curator::new(feeds, content, scorer, notifier, store, settings))
}
