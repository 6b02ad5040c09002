// src/config/secrets.rs
//! Credentials come from the environment only. Values are never logged.

use std::env;
use std::fmt;

use crate::error::ConfigError;

pub const ENV_WEBHOOK: &str = "DISCORD_WEBHOOK_URL";
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";

#[derive(Clone)]
pub struct Secrets {
    pub webhook_url: String,
    pub gemini_api_key: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("webhook_url_len", &self.webhook_url.len())
            .field("gemini_api_key_len", &self.gemini_api_key.len())
            .finish()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingSecret(name)),
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            webhook_url: required(ENV_WEBHOOK)?,
            gemini_api_key: required(ENV_GEMINI_KEY)?,
        })
    }

    /// Only the scoring key; for dry runs that never post.
    pub fn gemini_key_from_env() -> Result<String, ConfigError> {
        required(ENV_GEMINI_KEY)
    }
}
