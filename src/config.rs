use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::application::services::retry_policy::RetryPolicy;
use crate::infrastructure::workers::WorkerSettings;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub batch_size: u32,
    pub poll_interval_secs: u64,
    pub reclaim_interval_secs: u64,
    pub stale_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub retention_days: u32,
    pub retry_initial_backoff_secs: u64,
    pub retry_max_backoff_secs: u64,
    pub generation_api_url: Option<String>,
    pub generation_api_key: Option<String>,
    pub upload_api_url: Option<String>,
    pub upload_api_key: Option<String>,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://wedding_queue.db?mode=rwc".to_string());

        let batch_size: u32 = parse_or(&lookup, "QUEUE_BATCH_SIZE", 10)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "QUEUE_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        let metrics_port = parse_or(&lookup, "METRICS_PORT", 9000).map_err(|_| ConfigError::InvalidPort)?;

        Ok(Config {
            database_url,
            batch_size,
            poll_interval_secs: parse_or(&lookup, "QUEUE_POLL_INTERVAL_SECS", 5)?,
            reclaim_interval_secs: parse_or(&lookup, "QUEUE_RECLAIM_INTERVAL_SECS", 60)?,
            stale_timeout_secs: parse_or(&lookup, "QUEUE_STALE_TIMEOUT_SECS", 900)?,
            cleanup_interval_secs: parse_or(&lookup, "QUEUE_CLEANUP_INTERVAL_SECS", 3600)?,
            retention_days: parse_or(&lookup, "QUEUE_RETENTION_DAYS", 30)?,
            retry_initial_backoff_secs: parse_or(&lookup, "QUEUE_RETRY_INITIAL_BACKOFF_SECS", 0)?,
            retry_max_backoff_secs: parse_or(&lookup, "QUEUE_RETRY_MAX_BACKOFF_SECS", 300)?,
            generation_api_url: lookup("GENERATION_API_URL"),
            generation_api_key: lookup("GENERATION_API_KEY"),
            upload_api_url: lookup("UPLOAD_API_URL"),
            upload_api_key: lookup("UPLOAD_API_KEY"),
            otel_exporter_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT"),
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "wedding-queue".to_string()),
            metrics_port,
        })
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            batch_size: self.batch_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            reclaim_interval: Duration::from_secs(self.reclaim_interval_secs),
            stale_timeout: Duration::from_secs(self.stale_timeout_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            retention_days: self.retention_days,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry_initial_backoff_secs == 0 {
            RetryPolicy::immediate()
        } else {
            RetryPolicy::exponential(
                Duration::from_secs(self.retry_initial_backoff_secs),
                Duration::from_secs(self.retry_max_backoff_secs),
            )
        }
    }

    /// Generation endpoint and key; the worker cannot run image jobs without them.
    pub fn generation_api(&self) -> Result<(String, String), ConfigError> {
        Ok((
            self.generation_api_url
                .clone()
                .ok_or(ConfigError::Missing("GENERATION_API_URL"))?,
            self.generation_api_key
                .clone()
                .ok_or(ConfigError::Missing("GENERATION_API_KEY"))?,
        ))
    }

    pub fn upload_api(&self) -> Result<(String, String), ConfigError> {
        Ok((
            self.upload_api_url
                .clone()
                .ok_or(ConfigError::Missing("UPLOAD_API_URL"))?,
            self.upload_api_key
                .clone()
                .ok_or(ConfigError::Missing("UPLOAD_API_KEY"))?,
        ))
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid port number")]
    InvalidPort,
}
