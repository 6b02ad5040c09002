// src/config/mod.rs
//! Curator configuration: feed sources, interest profile, delivery settings.
//!
//! Resolution order:
//! 1) $CURATOR_CONFIG (file path or http(s) URL)
//! 2) config/curator.toml
//! 3) config/curator.json
//!
//! Both TOML and JSON are accepted; the extension is a hint, not a rule.

pub mod secrets;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use secrets::Secrets;

pub const ENV_CONFIG: &str = "CURATOR_CONFIG";
pub const DEFAULT_TOML_PATH: &str = "config/curator.toml";
pub const DEFAULT_JSON_PATH: &str = "config/curator.json";

pub const MAX_SOURCES: usize = 10;
pub const MAX_INTERESTS: usize = 50;
pub const MAX_NAME_CHARS: usize = 50;
/// Protocol ceiling on cards per message.
pub const MAX_BATCH: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterestTopic {
    pub topic: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    #[serde(default = "default_min_articles")]
    pub min_articles: usize,
    #[serde(default = "default_min_score")]
    pub min_relevance_score: u8,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            max_articles: default_max_articles(),
            min_articles: default_min_articles(),
            min_relevance_score: default_min_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeouts {
    #[serde(default = "default_fetch_secs")]
    pub feed_fetch_secs: u64,
    #[serde(default = "default_fetch_secs")]
    pub article_fetch_secs: u64,
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            feed_fetch_secs: default_fetch_secs(),
            article_fetch_secs: default_fetch_secs(),
            min_text_len: default_min_text_len(),
            max_text_len: default_max_text_len(),
        }
    }
}

impl Timeouts {
    pub fn feed_fetch(&self) -> Duration {
        Duration::from_secs(self.feed_fetch_secs)
    }

    pub fn article_fetch(&self) -> Duration {
        Duration::from_secs(self.article_fetch_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CuratorConfig {
    #[serde(alias = "rss_sources")]
    pub sources: Vec<FeedSource>,
    pub interests: Vec<InterestTopic>,
    #[serde(default, alias = "notification_settings")]
    pub notification: NotificationSettings,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_max_articles() -> usize {
    5
}
fn default_min_articles() -> usize {
    1
}
fn default_min_score() -> u8 {
    60
}
fn default_fetch_secs() -> u64 {
    30
}
fn default_min_text_len() -> usize {
    100
}
fn default_max_text_len() -> usize {
    50_000
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("data/retention")
}

impl CuratorConfig {
    pub fn enabled_sources(&self) -> impl Iterator<Item = &FeedSource> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Topic names in configured spelling.
    pub fn topic_names(&self) -> Vec<String> {
        self.interests.iter().map(|i| i.topic.clone()).collect()
    }

    pub fn high_priority_topics(&self) -> Vec<String> {
        self.interests
            .iter()
            .filter(|i| i.priority == Priority::High)
            .map(|i| i.topic.clone())
            .collect()
    }

    /// Items per message: configured max, capped at the protocol limit.
    pub fn batch_limit(&self) -> usize {
        self.notification.max_articles.min(MAX_BATCH)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |m: String| Err(ConfigError::Invalid(m));

        if self.sources.is_empty() || self.sources.len() > MAX_SOURCES {
            return invalid(format!(
                "sources must contain 1..={MAX_SOURCES} entries, got {}",
                self.sources.len()
            ));
        }
        for s in &self.sources {
            let n = s.name.trim().chars().count();
            if n == 0 || n > MAX_NAME_CHARS {
                return invalid(format!("source name {:?} must be 1..={MAX_NAME_CHARS} characters", s.name));
            }
            if !is_http_url(&s.url) {
                return invalid(format!("source {:?} has a non-http url {:?}", s.name, s.url));
            }
        }
        if self.enabled_sources().next().is_none() {
            return invalid("at least one source must be enabled".into());
        }

        if self.interests.is_empty() || self.interests.len() > MAX_INTERESTS {
            return invalid(format!(
                "interests must contain 1..={MAX_INTERESTS} entries, got {}",
                self.interests.len()
            ));
        }
        let mut seen = HashSet::new();
        for i in &self.interests {
            let n = i.topic.trim().chars().count();
            if n == 0 || n > MAX_NAME_CHARS {
                return invalid(format!("topic {:?} must be 1..={MAX_NAME_CHARS} characters", i.topic));
            }
            if !seen.insert(i.topic.trim().to_lowercase()) {
                return invalid(format!("duplicate interest topic {:?}", i.topic));
            }
        }

        let n = &self.notification;
        if !(1..=MAX_BATCH).contains(&n.max_articles) {
            return invalid(format!("max_articles must be 1..={MAX_BATCH}, got {}", n.max_articles));
        }
        if !(1..=MAX_BATCH).contains(&n.min_articles) {
            return invalid(format!("min_articles must be 1..={MAX_BATCH}, got {}", n.min_articles));
        }
        if n.min_articles > n.max_articles {
            return invalid(format!(
                "min_articles ({}) must not exceed max_articles ({})",
                n.min_articles, n.max_articles
            ));
        }
        if n.min_relevance_score > 100 {
            return invalid(format!(
                "min_relevance_score must be 0..=100, got {}",
                n.min_relevance_score
            ));
        }

        let t = &self.timeouts;
        if t.feed_fetch_secs == 0 || t.article_fetch_secs == 0 {
            return invalid("fetch timeouts must be positive".into());
        }
        if t.min_text_len > t.max_text_len {
            return invalid(format!(
                "min_text_len ({}) must not exceed max_text_len ({})",
                t.min_text_len, t.max_text_len
            ));
        }
        Ok(())
    }
}

fn is_http_url(s: &str) -> bool {
    let s = s.trim();
    (s.starts_with("http://") && s.len() > "http://".len())
        || (s.starts_with("https://") && s.len() > "https://".len())
}

/// Parse config text. TOML is tried first when hinted, then JSON, then TOML.
pub fn parse_config(s: &str, hint_ext: &str) -> Result<CuratorConfig, ConfigError> {
    let try_toml_first = hint_ext.eq_ignore_ascii_case("toml");
    if try_toml_first {
        if let Ok(cfg) = toml::from_str::<CuratorConfig>(s) {
            return Ok(cfg);
        }
    }
    match serde_json::from_str::<CuratorConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(json_err) => {
            if try_toml_first {
                // Report the TOML error for a .toml file.
                return toml::from_str::<CuratorConfig>(s).map_err(|e| ConfigError::Parse(e.to_string()));
            }
            toml::from_str::<CuratorConfig>(s)
                .map_err(|_| ConfigError::Parse(json_err.to_string()))
        }
    }
}

/// Load and validate from a file.
pub fn load_from(path: &Path) -> Result<CuratorConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, &ext)?;
    cfg.validate()?;
    Ok(cfg)
}

/// `https://github.com/u/r/blob/main/c.json` -> `https://raw.githubusercontent.com/u/r/main/c.json`
pub fn to_raw_github_url(url: &str) -> String {
    if url.contains("github.com/") && url.contains("/blob/") {
        url.replacen("github.com", "raw.githubusercontent.com", 1)
            .replacen("/blob/", "/", 1)
    } else {
        url.to_string()
    }
}

/// Fetch, parse and validate a remote config.
pub async fn load_from_url(client: &reqwest::Client, url: &str) -> Result<CuratorConfig, ConfigError> {
    let url = to_raw_github_url(url);
    let fetch_err = |reason: String| ConfigError::Fetch {
        url: url.clone(),
        reason,
    };
    let resp = client
        .get(&url)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", resp.status().as_u16())));
    }
    let body = resp.text().await.map_err(|e| fetch_err(e.to_string()))?;
    let hint = if url.ends_with(".toml") { "toml" } else { "json" };
    let cfg = parse_config(&body, hint)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load from a path or an http(s) URL.
pub async fn load_source(client: &reqwest::Client, source: &str) -> Result<CuratorConfig, ConfigError> {
    if is_http_url(source) {
        load_from_url(client, source).await
    } else {
        load_from(Path::new(source))
    }
}

/// Resolve using the env var, then the default file locations.
pub async fn load_default(client: &reqwest::Client) -> Result<CuratorConfig, ConfigError> {
    if let Ok(src) = std::env::var(ENV_CONFIG) {
        if !src.trim().is_empty() {
            return load_source(client, src.trim()).await;
        }
    }
    for p in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
    }
    Err(ConfigError::Invalid(format!(
        "no configuration found: set {ENV_CONFIG} or create {DEFAULT_TOML_PATH}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
store_dir = "/tmp/curator"

[[sources]]
name = "Rust Blog"
url = "https://blog.rust-lang.org/feed.xml"

[[sources]]
name = "Disabled"
url = "https://example.test/rss"
enabled = false

[[interests]]
topic = "Rust"
priority = "high"

[[interests]]
topic = "Kubernetes"
aliases = ["k8s"]

[notification]
max_articles = 5
min_relevance_score = 70
"#;

    const JSON: &str = r#"{
  "rss_sources": [{"name": "Go Blog", "url": "https://go.dev/blog/feed.atom", "enabled": true}],
  "interests": [{"topic": "Go", "priority": "medium"}],
  "notification_settings": {"max_articles": 3, "min_articles": 1, "min_relevance_score": 60}
}"#;

    #[test]
    fn toml_config_with_defaults() {
        let cfg = parse_config(TOML, "toml").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.enabled_sources().count(), 1);
        assert_eq!(cfg.topic_names(), vec!["Rust".to_string(), "Kubernetes".to_string()]);
        assert_eq!(cfg.high_priority_topics(), vec!["Rust".to_string()]);
        assert_eq!(cfg.interests[1].priority, Priority::Medium);
        assert_eq!(cfg.notification.min_articles, 1);
        assert_eq!(cfg.notification.min_relevance_score, 70);
        assert_eq!(cfg.timeouts.max_text_len, 50_000);
        assert_eq!(cfg.store_dir, PathBuf::from("/tmp/curator"));
    }

    #[test]
    fn json_accepts_legacy_field_names() {
        let cfg = parse_config(JSON, "json").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.sources[0].name, "Go Blog");
        assert_eq!(cfg.batch_limit(), 3);
        assert_eq!(cfg.store_dir, PathBuf::from("data/retention"));
    }

    #[test]
    fn validation_rejects_bad_profiles() {
        let base = parse_config(TOML, "toml").unwrap();

        let mut c = base.clone();
        c.sources.iter_mut().for_each(|s| s.enabled = false);
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = base.clone();
        c.interests.push(InterestTopic {
            topic: "rust".into(),
            aliases: vec![],
            priority: Priority::Low,
        });
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.notification.min_articles = 6;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.notification.min_relevance_score = 101;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.sources[0].url = "ftp://example.test/feed".into();
        assert!(c.validate().is_err());

        let mut c = base;
        c.interests[0].topic = "x".repeat(51);
        assert!(c.validate().is_err());
    }

    #[test]
    fn github_blob_urls_become_raw() {
        assert_eq!(
            to_raw_github_url("https://github.com/me/bot/blob/main/config/curator.json"),
            "https://raw.githubusercontent.com/me/bot/main/config/curator.json"
        );
        assert_eq!(to_raw_github_url("https://example.test/c.json"), "https://example.test/c.json");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_config("not = [valid", "toml"), Err(ConfigError::Parse(_))));
        assert!(matches!(parse_config("{", "json"), Err(ConfigError::Parse(_))));
    }
}
