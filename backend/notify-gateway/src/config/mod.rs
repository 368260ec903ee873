use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending envelopes before eviction/rejection kicks in
    pub max_queue_size: usize,
    /// Retry budget applied when an enqueue does not set its own
    pub default_max_retries: u32,
    /// First retry backoff; doubles per attempt
    pub base_retry_delay_ms: u64,
    /// Backoff ceiling
    pub max_retry_delay_ms: u64,
    /// Expiry/dedup sweep cadence in seconds
    pub cleanup_interval_secs: u64,
    /// TTL for deduplication entries in seconds (default: 120)
    pub dedup_window_secs: u64,
    /// Per-client outbound buffer; a full buffer counts as a failed write
    pub client_buffer_size: usize,
}

impl QueueConfig {
    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_queue_size: 1000,
            default_max_retries: 3,
            base_retry_delay_ms: 1000,
            max_retry_delay_ms: 30_000,
            cleanup_interval_secs: 30,
            dedup_window_secs: 120,
            client_buffer_size: 64,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, AppError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|_| AppError::Config(format!("{key} invalid: {raw}")))
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: env_parse("APP_PORT", "8000")?,
            },
            queue: QueueConfig {
                max_queue_size: env_parse("QUEUE_MAX_SIZE", "1000")?,
                default_max_retries: env_parse("QUEUE_DEFAULT_MAX_RETRIES", "3")?,
                base_retry_delay_ms: env_parse("QUEUE_BASE_RETRY_DELAY_MS", "1000")?,
                max_retry_delay_ms: env_parse("QUEUE_MAX_RETRY_DELAY_MS", "30000")?,
                cleanup_interval_secs: env_parse("QUEUE_CLEANUP_INTERVAL_SECS", "30")?,
                dedup_window_secs: env_parse("QUEUE_DEDUP_WINDOW_SECS", "120")?,
                client_buffer_size: env_parse("WS_CLIENT_BUFFER_SIZE", "64")?,
            },
        })
    }
}
