//! Configuration infrastructure
//!
//! Settings follow the original deployment surface: sane built-in defaults,
//! overridable through `SCRAPER_*` environment variables (nested fields use
//! a double underscore, e.g. `SCRAPER_RETRY__DETAIL_DELAY_SECS=1`).

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::infrastructure::http_client::HttpClientConfig;

const DEFAULT_START_URL: &str =
    "https://auto.ria.com/search/?lang_id=2&page=0&countpage=100&indexName=auto&custom=1&abroad=2";

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// First catalog page; pagination advances via its `page` parameter.
    pub start_url: String,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Simultaneous detail-page fetches.
    pub concurrency: usize,

    /// Catalog page cap, 0 = unbounded.
    pub max_pages_to_parse: u32,

    /// Cap on discovered-plus-skipped listings, 0 = unbounded.
    pub max_cars_to_process: u32,

    pub http: HttpClientConfig,

    pub retry: RetrySettings,

    pub logging: LoggingSettings,
}

/// Retry counts and delays for the three fetch stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Catalog page: attempts on transient 5xx.
    pub page_max_attempts: u32,
    /// Linear backoff: base + step * attempt.
    pub page_backoff_base_secs: u64,
    pub page_backoff_step_secs: u64,
    /// Pause between catalog page fetches.
    pub page_delay_ms: u64,

    /// Detail page: attempts with a fixed delay in between.
    pub detail_max_attempts: u32,
    pub detail_delay_secs: u64,

    /// Phone endpoint: attempt cap shared by 429 and generic failures.
    pub phone_max_attempts: u32,
    /// Wait on 429 without a usable Retry-After header.
    pub phone_rate_limit_wait_secs: u64,
    /// Jittered pause bounds around phone requests.
    pub phone_pause_min_ms: u64,
    pub phone_pause_max_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            page_max_attempts: 3,
            page_backoff_base_secs: 5,
            page_backoff_step_secs: 5,
            page_delay_ms: 1000,
            detail_max_attempts: 3,
            detail_delay_secs: 5,
            phone_max_attempts: 5,
            phone_rate_limit_wait_secs: 10,
            phone_pause_min_ms: 2000,
            phone_pause_max_ms: 3000,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable file output next to console output.
    pub file_output: bool,

    /// Directory for log files when file output is enabled.
    pub directory: String,

    pub file_name: String,

    /// Module-specific log level filters (e.g., "sqlx": "warn").
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("hyper_util".to_string(), "warn".to_string());
        module_filters.insert("reqwest".to_string(), "warn".to_string());

        Self {
            level: "info".to_string(),
            file_output: false,
            directory: "logs".to_string(),
            file_name: "scraper.log".to_string(),
            module_filters,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_url: DEFAULT_START_URL.to_string(),
            database_url: "postgresql://postgres:postgres_password@db:5432/autoria".to_string(),
            concurrency: 3,
            max_pages_to_parse: 0,
            max_cars_to_process: 0,
            http: HttpClientConfig::default(),
            retry: RetrySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Load defaults layered with `SCRAPER_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(Environment::with_prefix("SCRAPER").separator("__"))
            .build()
            .context("Failed to assemble configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_expectations() {
        let settings = Settings::default();
        assert_eq!(settings.concurrency, 3);
        assert_eq!(settings.max_pages_to_parse, 0);
        assert_eq!(settings.max_cars_to_process, 0);
        assert_eq!(settings.retry.detail_max_attempts, 3);
        assert_eq!(settings.retry.phone_max_attempts, 5);
        assert!(settings.start_url.contains("page=0"));
    }

    #[test]
    fn load_without_environment_yields_defaults() {
        let settings = Settings::load().expect("defaults should deserialize");
        assert_eq!(settings.concurrency, Settings::default().concurrency);
        assert_eq!(settings.logging.level, "info");
    }
}
