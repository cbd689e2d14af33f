//! Exponential-backoff retry around fallible async operations.
//!
//! Errors are classified before every retry decision. Non-retryable errors
//! (validation, auth, rate limit) surface after the first attempt; retryable
//! ones are tried again after `min(base * multiplier^(n-1), max)` until
//! `max_retries` attempts have been made.

use backon::{ExponentialBuilder, Retryable};
use oldpho_core::{classify, Locale};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::config::humantime_serde;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first call included
    pub max_retries: u32,

    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    pub multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.multiplier)
            .with_max_times(self.max_retries.saturating_sub(1) as usize)
    }
}

/// Retry wrapper with per-key diagnostic counters.
///
/// Counters only record how often a key was retried; they never block a
/// later call.
pub struct RetryManager {
    config: RetryConfig,
    locale: Locale,
    counters: Mutex<HashMap<String, u64>>,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            locale: Locale::default(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying retryable failures with backoff.
    ///
    /// The last error is returned once attempts run out.
    pub async fn retry_with_backoff<T, E, F, Fut>(
        &self,
        key: Option<&str>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        let locale = self.locale;
        operation
            .retry(self.config.backoff())
            .sleep(tokio::time::sleep)
            .when(|e: &E| classify(e, locale).retryable)
            .notify(|e: &E, delay: Duration| {
                if let Some(key) = key {
                    *self.counters.lock().entry(key.to_string()).or_insert(0) += 1;
                }
                tracing::warn!(
                    key = key.unwrap_or("-"),
                    error = %e,
                    delay = ?delay,
                    "Retrying after retryable error"
                );
            })
            .await
    }

    /// Retries recorded for `key` so far.
    pub fn retry_count(&self, key: &str) -> u64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }

    pub fn reset_counters(&self) {
        self.counters.lock().clear();
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
