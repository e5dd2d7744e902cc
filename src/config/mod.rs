//! # Worker Configuration
//!
//! Typed configuration for the worker, loaded by [`ConfigManager`] from
//! layered sources (built-in defaults, an optional TOML file and environment
//! variables) and validated before anything connects.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use worker_pipeline::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let prefetch = manager.config().queue.prefetch;
//! let max_retries = manager.config().retry.max_retries;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{defaults, ExecutionMethod};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub execution: ExecutionConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
}

impl WorkerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.queue.validate()?;
        self.retry.validate()?;
        self.execution.validate()?;
        Ok(())
    }
}

/// Broker connection and queue layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub url: String,
    pub main_queue: String,
    pub retry_queue: String,
    pub dead_letter_queue: String,
    pub retry_exchange: String,
    /// Downstream queue for completed results; unset disables publishing
    pub result_queue: Option<String>,
    /// Maximum unacked deliveries per consumer
    pub prefetch: u16,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: defaults::BROKER_URL.to_string(),
            main_queue: defaults::MAIN_QUEUE.to_string(),
            retry_queue: defaults::RETRY_QUEUE.to_string(),
            dead_letter_queue: defaults::DEAD_LETTER_QUEUE.to_string(),
            retry_exchange: defaults::RETRY_EXCHANGE.to_string(),
            result_queue: Some(defaults::RESULT_QUEUE.to_string()),
            prefetch: defaults::PREFETCH,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("queue.url", &self.url),
            ("queue.main_queue", &self.main_queue),
            ("queue.retry_queue", &self.retry_queue),
            ("queue.dead_letter_queue", &self.dead_letter_queue),
            ("queue.retry_exchange", &self.retry_exchange),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(field, "queue"));
            }
        }

        if self.main_queue == self.retry_queue || self.main_queue == self.dead_letter_queue {
            return Err(ConfigurationError::invalid_value(
                "queue.main_queue",
                &self.main_queue,
                "main queue must differ from the retry and dead-letter queues",
            ));
        }

        if self.prefetch == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.prefetch",
                "0",
                "prefetch must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    /// Symmetric jitter band as a fraction of the base delay, in `[0, 1)`
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            initial_delay_ms: defaults::INITIAL_DELAY_MS,
            backoff_factor: defaults::BACKOFF_FACTOR,
            max_delay_ms: defaults::MAX_DELAY_MS,
            jitter_factor: defaults::JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "retry.jitter_factor",
                self.jitter_factor.to_string(),
                "must satisfy 0 <= jitter_factor < 1",
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.backoff_factor",
                self.backoff_factor.to_string(),
                "must be a finite value >= 1",
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.initial_delay_ms",
                self.initial_delay_ms.to_string(),
                format!("must not exceed max_delay_ms ({})", self.max_delay_ms),
            ));
        }
        Ok(())
    }
}

/// Executor and routing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Method used when a job neither names one nor needs a browser
    pub default_method: ExecutionMethod,
    pub max_concurrent_browsers: usize,
    pub user_agent: String,
    pub request_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub selector_timeout_ms: u64,
    pub browser_headless: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_method: ExecutionMethod::Auto,
            max_concurrent_browsers: defaults::MAX_CONCURRENT_BROWSERS,
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            navigation_timeout_ms: defaults::NAVIGATION_TIMEOUT_MS,
            selector_timeout_ms: defaults::SELECTOR_TIMEOUT_MS,
            browser_headless: true,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_browsers == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_browsers",
                "0",
                "at least one browser slot is required",
            ));
        }
        if self.request_timeout_ms == 0 || self.navigation_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.request_timeout_ms",
                "0",
                "timeouts must be positive",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }
}

/// Progress reporting endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// GraphQL endpoint; unset logs progress instead of sending it
    pub graphql_url: Option<String>,
    pub graphql_api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            graphql_url: None,
            graphql_api_key: None,
            timeout_ms: defaults::REPORT_TIMEOUT_MS,
        }
    }
}

impl ReportingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
    /// Directory for JSON log files; unset disables file output
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directory: None,
        }
    }
}
