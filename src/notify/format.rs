// src/notify/format.rs
//! Webhook payload shaping under Discord's embed limits.

use serde::{Deserialize, Serialize};

use crate::model::{Overview, RankedBatch, ScoredItem};
use crate::text::truncate_with_ellipsis;

pub const MAX_EMBEDS: usize = 10;
pub const MAX_TITLE: usize = 256;
pub const MAX_DESCRIPTION: usize = 4096;
pub const MAX_FIELD_NAME: usize = 256;
pub const MAX_FIELD_VALUE: usize = 1024;
pub const MAX_FOOTER: usize = 2048;
pub const MAX_CONTENT: usize = 2000;

/// #58B9FF
pub const ARTICLE_COLOR: u32 = 0x58B9FF;
/// #3498DB
pub const OVERVIEW_COLOR: u32 = 0x3498DB;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl EmbedField {
    fn inline(name: &str, value: &str) -> Self {
        Self {
            name: truncate_with_ellipsis(name, MAX_FIELD_NAME),
            value: truncate_with_ellipsis(value, MAX_FIELD_VALUE),
            inline: true,
        }
    }
}

/// Header line of the message, e.g. `📰 Daily Article Digest - 2025-01-31`.
pub fn content_line(label: &str) -> String {
    truncate_with_ellipsis(&format!("📰 Daily Article Digest - {label}"), MAX_CONTENT)
}

pub fn article_embed(s: &ScoredItem) -> Embed {
    let topics = if s.assessment.matching_topics.is_empty() {
        "N/A".to_string()
    } else {
        s.assessment.matching_topics.join(", ")
    };
    Embed {
        title: truncate_with_ellipsis(&s.title, MAX_TITLE),
        description: truncate_with_ellipsis(&s.assessment.summary, MAX_DESCRIPTION),
        url: Some(s.item.url.clone()),
        color: ARTICLE_COLOR,
        fields: vec![
            EmbedField::inline("Relevance", &format!("{}/100", s.assessment.score)),
            EmbedField::inline("Topics", &topics),
        ],
        footer: Some(EmbedFooter {
            text: truncate_with_ellipsis(&format!("Source: {}", s.item.source), MAX_FOOTER),
        }),
    }
}

pub fn overview_embed(ov: &Overview, item_count: usize) -> Embed {
    let mut parts: Vec<String> = Vec::new();
    if !ov.overall_summary.is_empty() {
        parts.push(format!("**📋 Highlights**\n{}", ov.overall_summary));
    }
    if !ov.must_read.is_empty() {
        parts.push(format!("\n**⭐ Must read**\n{}", ov.must_read));
    }
    if !ov.recommendations.is_empty() {
        parts.push("\n**📚 Reading guide**".to_string());
        for (i, rec) in ov.recommendations.iter().enumerate() {
            parts.push(format!("{}. {}", i + 1, rec));
        }
    }
    Embed {
        title: truncate_with_ellipsis(&format!("📊 Today's picks ({item_count})"), MAX_TITLE),
        description: truncate_with_ellipsis(&parts.join("\n"), MAX_DESCRIPTION),
        color: OVERVIEW_COLOR,
        ..Embed::default()
    }
}

/// Overview card first (when present), then one card per item in rank order.
/// The card-count limit is checked by the caller before anything is sent.
pub fn build_payload(batch: &RankedBatch, label: &str) -> WebhookPayload {
    let mut embeds = Vec::with_capacity(batch.card_count());
    if let Some(ov) = &batch.overview {
        embeds.push(overview_embed(ov, batch.items.len()));
    }
    embeds.extend(batch.items.iter().map(article_embed));
    WebhookPayload {
        content: content_line(label),
        embeds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateItem, RelevanceAssessment};
    use crate::text::rune_len;
    use chrono::Utc;

    fn item(title: &str, topics: &[&str]) -> ScoredItem {
        let now = Utc::now();
        ScoredItem {
            item: CandidateItem {
                title: title.into(),
                url: "https://blog.test/p".into(),
                source: "Blog".into(),
                published_at: now,
                fetched_at: now,
            },
            title: title.into(),
            assessment: RelevanceAssessment {
                url: "https://blog.test/p".into(),
                score: 88,
                matching_topics: topics.iter().map(|s| s.to_string()).collect(),
                summary: "A summary".into(),
                reasoning: String::new(),
                is_relevant: true,
                evaluated_at: now,
            },
        }
    }

    #[test]
    fn article_card_shape() {
        let e = article_embed(&item("Hello", &["Rust", "Go"]));
        assert_eq!(e.color, 5814783);
        assert_eq!(ARTICLE_COLOR, 0x58B9FF);
        assert_eq!(e.url.as_deref(), Some("https://blog.test/p"));
        assert_eq!(e.fields[0].name, "Relevance");
        assert_eq!(e.fields[0].value, "88/100");
        assert!(e.fields[0].inline);
        assert_eq!(e.fields[1].value, "Rust, Go");
        assert_eq!(e.footer.unwrap().text, "Source: Blog");

        let e = article_embed(&item("Hello", &[]));
        assert_eq!(e.fields[1].value, "N/A");
    }

    #[test]
    fn long_fields_are_truncated_by_characters() {
        let e = article_embed(&item(&"題".repeat(300), &["Rust"]));
        assert_eq!(rune_len(&e.title), MAX_TITLE);
        assert!(e.title.ends_with("..."));
    }

    #[test]
    fn overview_goes_first() {
        let batch = RankedBatch::new(vec![item("A", &["Rust"]), item("B", &["Go"])]).with_overview(Some(
            Overview {
                overall_summary: "Async everywhere".into(),
                must_read: "A".into(),
                recommendations: vec!["read A".into(), "skim B".into()],
            },
        ));
        let p = build_payload(&batch, "2025-01-31");
        assert_eq!(p.content, "📰 Daily Article Digest - 2025-01-31");
        assert_eq!(p.embeds.len(), 3);
        assert_eq!(p.embeds[0].title, "📊 Today's picks (2)");
        assert_eq!(p.embeds[0].color, OVERVIEW_COLOR);
        assert!(p.embeds[0].description.contains("1. read A\n2. skim B"));
        assert_eq!(p.embeds[1].title, "A");
    }

    #[test]
    fn optional_members_are_omitted_on_the_wire() {
        let v = serde_json::to_value(overview_embed(&Overview::default(), 0)).unwrap();
        assert!(v.get("url").is_none());
        assert!(v.get("fields").is_none());
        assert!(v.get("footer").is_none());
    }
}
