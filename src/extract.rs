// src/extract.rs
//! Article download and readable-text extraction.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::cancel::CancelToken;
use crate::error::ExtractError;
use crate::model::{CandidateItem, ExtractedContent};
use crate::text::{collapse_whitespace, rune_len, truncate_runes};

/// Pages larger than this are not articles we want to read.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_MIN_TEXT_CHARS: usize = 100;
pub const DEFAULT_MAX_TEXT_CHARS: usize = 50_000;

/// Produces readable content for a candidate item.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn extract(
        &self,
        item: &CandidateItem,
        cancel: &CancelToken,
    ) -> Result<ExtractedContent, ExtractError>;
}

// ------------------------------------------------------------
// Fetching
// ------------------------------------------------------------

pub struct ArticleFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl ArticleFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(30),
            max_bytes: MAX_BODY_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// GET `url` and return the body as text.
    pub async fn fetch(&self, url: &str, cancel: &CancelToken) -> Result<String, ExtractError> {
        let mut resp = cancel
            .run(
                self.client
                    .get(url)
                    .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
                    .timeout(self.timeout)
                    .send(),
            )
            .await?
            .map_err(|e| ExtractError::Fetch(e.to_string()))?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(ExtractError::Status(resp.status().as_u16()));
        }
        if let Some(len) = resp.content_length() {
            let len = usize::try_from(len).unwrap_or(usize::MAX);
            if len > self.max_bytes {
                return Err(ExtractError::TooLarge(len));
            }
        }

        // Content-Length can be absent or wrong; enforce the cap while reading.
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = cancel
            .run(resp.chunk())
            .await?
            .map_err(|e| ExtractError::Fetch(e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_bytes {
                return Err(ExtractError::TooLarge(body.len()));
            }
        }

        if body.is_empty() {
            return Err(ExtractError::EmptyBody);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

// ------------------------------------------------------------
// Extraction
// ------------------------------------------------------------

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static extraction regex"))
}

/// Elements dropped wholesale before text extraction.
const CHROME_TAGS: [&str; 6] = ["script", "style", "noscript", "nav", "header", "footer"];

/// One pattern per tag in [`CHROME_TAGS`]; the regex crate has no backreferences.
fn chrome_patterns() -> &'static [Regex] {
    static RE_CHROME: OnceCell<Vec<Regex>> = OnceCell::new();
    RE_CHROME.get_or_init(|| {
        CHROME_TAGS
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                    .expect("static extraction regex")
            })
            .collect()
    })
}

fn strip_chrome(html: &str) -> String {
    chrome_patterns()
        .iter()
        .fold(html.to_string(), |acc, r| r.replace_all(&acc, " ").into_owned())
}

fn inner_of<'a>(html: &'a str, cell: &'static OnceCell<Regex>, pattern: &str) -> Option<&'a str> {
    re(cell, pattern)
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Remove tags, decode entities, collapse whitespace.
pub fn html_to_text(fragment: &str) -> String {
    static RE_COMMENT: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let no_comments = re(&RE_COMMENT, r"(?s)<!--.*?-->").replace_all(fragment, " ");
    let no_tags = re(&RE_TAGS, r"(?s)</?[A-Za-z!][^>]*>").replace_all(&no_comments, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    collapse_whitespace(&decoded)
}

/// Turns article HTML into bounded plain text.
#[derive(Debug, Clone)]
pub struct Extractor {
    min_len: usize,
    max_len: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_TEXT_CHARS, DEFAULT_MAX_TEXT_CHARS)
    }
}

impl Extractor {
    pub fn new(min_len: usize, max_len: usize) -> Self {
        Self { min_len, max_len }
    }

    /// Page title from `<title>`, falling back to the first `<h1>`.
    pub fn title(&self, html: &str) -> Option<String> {
        static RE_TITLE: OnceCell<Regex> = OnceCell::new();
        static RE_H1: OnceCell<Regex> = OnceCell::new();
        [
            inner_of(html, &RE_TITLE, r"(?is)<title\b[^>]*>(.*?)</title\s*>"),
            inner_of(html, &RE_H1, r"(?is)<h1\b[^>]*>(.*?)</h1\s*>"),
        ]
        .into_iter()
        .flatten()
        .map(html_to_text)
        .find(|t| !t.is_empty())
    }

    /// Readable body text, bounded to `[min_len, max_len]` characters.
    pub fn body_text(&self, html: &str) -> Result<String, ExtractError> {
        static RE_ARTICLE: OnceCell<Regex> = OnceCell::new();
        static RE_MAIN: OnceCell<Regex> = OnceCell::new();
        static RE_BODY: OnceCell<Regex> = OnceCell::new();

        let cleaned = strip_chrome(html);

        let region = inner_of(&cleaned, &RE_ARTICLE, r"(?is)<article\b[^>]*>(.*)</article\s*>")
            .or_else(|| inner_of(&cleaned, &RE_MAIN, r"(?is)<main\b[^>]*>(.*)</main\s*>"))
            .or_else(|| inner_of(&cleaned, &RE_BODY, r"(?is)<body\b[^>]*>(.*)</body\s*>"))
            .unwrap_or(cleaned.as_str());

        let text = html_to_text(region);
        let len = rune_len(&text);
        if len < self.min_len {
            return Err(ExtractError::TooShort {
                len,
                min: self.min_len,
            });
        }
        if len > self.max_len {
            tracing::debug!(len, max = self.max_len, "article text truncated");
            return Ok(truncate_runes(&text, self.max_len).to_string());
        }
        Ok(text)
    }

    pub fn extract(&self, html: &str) -> Result<ExtractedContent, ExtractError> {
        let text = self.body_text(html)?;
        Ok(ExtractedContent {
            title: self.title(html),
            text,
        })
    }
}

/// Fetch over HTTP, then extract.
pub struct WebExtractor {
    fetcher: ArticleFetcher,
    extractor: Extractor,
}

impl WebExtractor {
    pub fn new(fetcher: ArticleFetcher, extractor: Extractor) -> Self {
        Self { fetcher, extractor }
    }
}

#[async_trait]
impl ContentSource for WebExtractor {
    async fn extract(
        &self,
        item: &CandidateItem,
        cancel: &CancelToken,
    ) -> Result<ExtractedContent, ExtractError> {
        let html = self.fetcher.fetch(&item.url, cancel).await?;
        let out = self.extractor.extract(&html)?;
        tracing::debug!(url = %item.url, chars = rune_len(&out.text), "article extracted");
        Ok(out)
    }
}
