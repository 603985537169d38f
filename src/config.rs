use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::fetcher::{DEFAULT_PLACE, DEFAULT_WFS_URL};
use crate::telegram::DEFAULT_API_URL;
use crate::tracker::DEFAULT_THRESHOLD_CELSIUS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub telegram_api_url: String,
    pub fmi_wfs_url: String,
    pub fmi_place: String,
    pub poll_interval_minutes: u64,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: usize,
    pub threshold_celsius: f64,
    pub http_timeout_seconds: u64,
    pub server_host: String,
    pub server_port: u16,
}

/// Parse an optional variable, falling back to `default` when unset or invalid
fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = env::var("BOT_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        Ok(Config {
            bot_token,
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            fmi_wfs_url: env::var("FMI_WFS_URL").unwrap_or_else(|_| DEFAULT_WFS_URL.to_string()),
            fmi_place: env::var("FMI_PLACE").unwrap_or_else(|_| DEFAULT_PLACE.to_string()),
            poll_interval_minutes: var_or("POLL_INTERVAL_MINUTES", 10).max(1),
            cache_ttl_seconds: var_or("CACHE_TTL_SECONDS", DEFAULT_TTL.as_secs()),
            cache_max_entries: var_or("CACHE_MAX_ENTRIES", DEFAULT_MAX_ENTRIES).max(1),
            threshold_celsius: var_or("THRESHOLD_CELSIUS", DEFAULT_THRESHOLD_CELSIUS),
            http_timeout_seconds: var_or("HTTP_TIMEOUT_SECONDS", 10).max(1),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: var_or("SERVER_PORT", 8080),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

// The token must never reach the logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("fmi_wfs_url", &self.fmi_wfs_url)
            .field("fmi_place", &self.fmi_place)
            .field("poll_interval_minutes", &self.poll_interval_minutes)
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("threshold_celsius", &self.threshold_celsius)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .finish()
    }
}
