// src/notify/mod.rs
//! Batch delivery channels.

pub mod discord;
pub mod format;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::NotifyError;
use crate::model::RankedBatch;

pub use discord::{DiscordNotifier, HttpTransport, WebhookResponse, WebhookTransport};
pub use format::{build_payload, WebhookPayload};

/// Delivers one ranked batch as a single message. Returns the message id.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        batch: &RankedBatch,
        label: &str,
        cancel: &CancelToken,
    ) -> Result<String, NotifyError>;

    fn name(&self) -> &'static str;
}

/// Logs the batch instead of sending it. Used by `--dry-run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(
        &self,
        batch: &RankedBatch,
        label: &str,
        cancel: &CancelToken,
    ) -> Result<String, NotifyError> {
        if cancel.is_cancelled() {
            return Err(NotifyError::Cancelled);
        }
        let cards = batch.card_count();
        if cards > format::MAX_EMBEDS {
            return Err(NotifyError::TooManyCards {
                count: cards,
                max: format::MAX_EMBEDS,
            });
        }
        let payload = build_payload(batch, label);
        tracing::info!(content = %payload.content, cards, "dry run: webhook payload");
        for (i, e) in payload.embeds.iter().enumerate() {
            tracing::info!(card = i, title = %e.title, url = ?e.url, "dry run: card");
        }
        Ok(format!("dry-run-{label}"))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
