// src/model.rs
//! Data carried through one curation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry pulled from a feed. The URL is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// Readable text pulled out of an article page. Discarded after scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Page title, when the page had one. Overrides the feed title.
    pub title: Option<String>,
    /// Plain text, already bounded to the configured character range.
    pub text: String,
}

/// Validated verdict from the relevance scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceAssessment {
    pub url: String,
    /// 0..=100
    pub score: u8,
    /// Subset of the configured interest topics.
    pub matching_topics: Vec<String>,
    /// 50..=200 characters.
    pub summary: String,
    pub reasoning: String,
    pub is_relevant: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// An item that survived scoring, paired with its assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredItem {
    pub item: CandidateItem,
    /// Display title: the extracted page title if any, else the feed title.
    pub title: String,
    pub assessment: RelevanceAssessment,
}

/// Free-text digest of the whole batch, shown as the first card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub overall_summary: String,
    #[serde(default)]
    pub must_read: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Ranked items ready for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedBatch {
    pub items: Vec<ScoredItem>,
    pub overview: Option<Overview>,
}

impl RankedBatch {
    pub fn new(items: Vec<ScoredItem>) -> Self {
        Self {
            items,
            overview: None,
        }
    }

    pub fn with_overview(mut self, overview: Option<Overview>) -> Self {
        self.overview = overview;
        self
    }

    /// Cards this batch renders to: one per item plus the optional overview.
    pub fn card_count(&self) -> usize {
        self.items.len() + usize::from(self.overview.is_some())
    }
}
