//! Application configuration from environment variables.
//!
//!   LITPER_DB_PATH            - SurrealDB path (default: data/litper.db)
//!   LITPER_ML_BACKEND_URL     - ML backend base URL (default: http://localhost:8000)
//!   LITPER_HTTP_TIMEOUT_SECS  - Outbound HTTP timeout (default: 60)
//!   ANTHROPIC_MODEL           - Claude model id
//!   LITPER_PORT               - REST server port (default: 8080)

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_DB_PATH: &str = "data/litper.db";
pub const DEFAULT_ML_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: String,
    pub ml_backend_url: String,
    pub http_timeout: Duration,
    pub anthropic_model: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            ml_backend_url: DEFAULT_ML_BACKEND_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, value);
            default
        }),
        None => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            db_path: lookup("LITPER_DB_PATH").unwrap_or(defaults.db_path),
            ml_backend_url: lookup("LITPER_ML_BACKEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ml_backend_url),
            http_timeout: Duration::from_secs(parse_or(
                "LITPER_HTTP_TIMEOUT_SECS",
                lookup("LITPER_HTTP_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )),
            anthropic_model: lookup("ANTHROPIC_MODEL").unwrap_or(defaults.anthropic_model),
            port: parse_or("LITPER_PORT", lookup("LITPER_PORT"), DEFAULT_PORT),
        }
    }

    /// Shared client for every outbound call
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()?)
    }
}
