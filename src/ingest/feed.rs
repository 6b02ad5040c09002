// src/ingest/feed.rs
//! RSS 2.0 and Atom parsing, plus the HTTP and fixture feed providers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use super::FeedProvider;
use crate::cancel::CancelToken;
use crate::error::FeedError;
use crate::model::CandidateItem;
use crate::text::{collapse_whitespace, truncate_runes};

/// Titles beyond this are junk; cut them.
pub const MAX_TITLE_CHARS: usize = 500;

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

// ------------------------------------------------------------
// Wire shapes
// ------------------------------------------------------------

/// Element text, tolerant of attributes and CDATA.
#[derive(Debug, Default, Deserialize)]
struct XmlText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<XmlText>,
    link: Option<XmlText>,
    #[serde(rename = "pubDate")]
    pub_date: Option<XmlText>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<XmlText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<XmlText>,
    updated: Option<XmlText>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

// ------------------------------------------------------------
// Parsing
// ------------------------------------------------------------

/// Replace HTML-only entities that are not valid XML. Feeds in the wild
/// embed them in titles and descriptions.
pub fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Look at the root element to tell RSS from Atom.
pub fn detect_format(xml: &str) -> Result<FeedFormat, FeedError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"rss" => Ok(FeedFormat::Rss),
                    b"feed" => Ok(FeedFormat::Atom),
                    other => Err(FeedError::Parse(format!(
                        "unsupported root element <{}>",
                        String::from_utf8_lossy(other)
                    ))),
                };
            }
            Ok(Event::Eof) => return Err(FeedError::Parse("empty document".into())),
            Ok(_) => continue,
            Err(e) => return Err(FeedError::Parse(e.to_string())),
        }
    }
}

fn to_utc(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

pub fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822).ok().and_then(to_utc)
}

pub fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339).ok().and_then(to_utc)
}

fn clean_title(raw: Option<XmlText>) -> Option<String> {
    let t = collapse_whitespace(&raw?.value);
    if t.is_empty() {
        return None;
    }
    Some(truncate_runes(&t, MAX_TITLE_CHARS).to_string())
}

fn clean_link(raw: &str) -> Option<String> {
    let l = raw.trim();
    (!l.is_empty()).then(|| l.to_string())
}

/// Parse a feed document into candidate items.
///
/// Entries without a title or link are skipped. A missing or unreadable
/// date falls back to `fetched_at`.
pub fn parse_feed(
    xml: &str,
    source: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<CandidateItem>, FeedError> {
    let xml = scrub_html_entities_for_xml(xml);
    let mut out = Vec::new();

    match detect_format(&xml)? {
        FeedFormat::Rss => {
            let rss: Rss =
                quick_xml::de::from_str(&xml).map_err(|e| FeedError::Parse(e.to_string()))?;
            for it in rss.channel.items {
                let link = it.link.as_ref().and_then(|l| clean_link(&l.value));
                let (Some(title), Some(url)) = (clean_title(it.title), link) else {
                    tracing::debug!(source, "skipping rss item without title or link");
                    continue;
                };
                let published_at = it
                    .pub_date
                    .and_then(|d| parse_rfc2822(&d.value))
                    .unwrap_or(fetched_at);
                out.push(CandidateItem {
                    title,
                    url,
                    source: source.to_string(),
                    published_at,
                    fetched_at,
                });
            }
        }
        FeedFormat::Atom => {
            let feed: AtomFeed =
                quick_xml::de::from_str(&xml).map_err(|e| FeedError::Parse(e.to_string()))?;
            for entry in feed.entries {
                let link = entry
                    .links
                    .iter()
                    .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                    .or_else(|| entry.links.first())
                    .and_then(|l| clean_link(&l.href));
                let (Some(title), Some(url)) = (clean_title(entry.title), link) else {
                    tracing::debug!(source, "skipping atom entry without title or link");
                    continue;
                };
                let published_at = entry
                    .published
                    .and_then(|d| parse_rfc3339(&d.value))
                    .or_else(|| entry.updated.and_then(|d| parse_rfc3339(&d.value)))
                    .unwrap_or(fetched_at);
                out.push(CandidateItem {
                    title,
                    url,
                    source: source.to_string(),
                    published_at,
                    fetched_at,
                });
            }
        }
    }

    Ok(out)
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// Feed fetched over HTTP.
pub struct HttpFeed {
    name: String,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeed {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl FeedProvider for HttpFeed {
    async fn fetch_items(&self, cancel: &CancelToken) -> Result<Vec<CandidateItem>, FeedError> {
        let resp = cancel
            .run(
                self.client
                    .get(&self.url)
                    .header(reqwest::header::ACCEPT, FEED_ACCEPT)
                    .timeout(self.timeout)
                    .send(),
            )
            .await?
            .map_err(|e| FeedError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FeedError::Status(resp.status().as_u16()));
        }
        let body = cancel
            .run(resp.text())
            .await?
            .map_err(|e| FeedError::Http(e.to_string()))?;
        parse_feed(&body, &self.name, Utc::now())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Feed backed by an in-memory document.
pub struct FixtureFeed {
    name: String,
    xml: String,
}

impl FixtureFeed {
    pub fn new(name: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            xml: xml.into(),
        }
    }
}

#[async_trait]
impl FeedProvider for FixtureFeed {
    async fn fetch_items(&self, cancel: &CancelToken) -> Result<Vec<CandidateItem>, FeedError> {
        if cancel.is_cancelled() {
            return Err(FeedError::Cancelled);
        }
        parse_feed(&self.xml, &self.name, Utc::now())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
