//! # Retry Policy
//!
//! Exponential backoff with symmetric jitter:
//!
//! ```text
//! base(n)  = min(initial_delay * backoff_factor^n, max_delay)
//! delay(n) = max(0, base(n) + U(-base(n) * jitter, +base(n) * jitter))
//! ```
//!
//! `n` is the task's `retryCount` before the retry is scheduled. The random
//! source is injected so tests can pin it with [`RetryPolicy::with_rng`].

use std::time::Duration;

use parking_lot::Mutex;

use super::error_classifier::PermanenceClassifier;
use crate::config::{ConfigResult, RetryConfig};
use crate::error::TaskError;

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    /// `retry_count` already reached `max_retries`
    Exhausted,
    /// The error will not go away on its own
    Permanent,
}

#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    rng: Mutex<fastrand::Rng>,
}

impl RetryPolicy {
    /// Rejects configs that fail [`RetryConfig::validate`]
    pub fn new(config: RetryConfig) -> ConfigResult<Self> {
        Self::build(config, fastrand::Rng::new())
    }

    /// Deterministic jitter for tests
    pub fn with_rng(config: RetryConfig, seed: u64) -> ConfigResult<Self> {
        Self::build(config, fastrand::Rng::with_seed(seed))
    }

    fn build(config: RetryConfig, rng: fastrand::Rng) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Delay before jitter, in milliseconds
    pub fn base_delay_ms(&self, retry_count: u32) -> f64 {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let raw = self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(exponent);
        let max = self.config.max_delay_ms as f64;
        if raw.is_finite() {
            raw.min(max)
        } else {
            max
        }
    }

    pub fn base_delay(&self, retry_count: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms(retry_count) as u64)
    }

    /// Jittered delay for the retry that follows attempt `retry_count + 1`
    pub fn get_delay(&self, retry_count: u32) -> Duration {
        let base = self.base_delay_ms(retry_count);
        let band = base * self.config.jitter_factor;
        let unit = self.rng.lock().f64();
        let jittered = base + (unit * 2.0 - 1.0) * band;
        Duration::from_millis(jittered.max(0.0).floor() as u64)
    }

    pub fn should_retry<C>(&self, error: &TaskError, retry_count: u32, classifier: &C) -> bool
    where
        C: PermanenceClassifier + ?Sized,
    {
        matches!(
            self.decide(error, retry_count, classifier),
            RetryDecision::Retry { .. }
        )
    }

    pub fn decide<C>(&self, error: &TaskError, retry_count: u32, classifier: &C) -> RetryDecision
    where
        C: PermanenceClassifier + ?Sized,
    {
        if retry_count >= self.config.max_retries {
            return RetryDecision::Exhausted;
        }
        if classifier.is_permanent(error) {
            return RetryDecision::Permanent;
        }
        RetryDecision::Retry {
            delay: self.get_delay(retry_count),
        }
    }
}
