//! Runtime configuration.
//!
//! Every tunable has a default; values can be overridden from YAML or from
//! `OLDPHO_*` environment variables. Durations are written the human way
//! (`60s`, `5m`, `1h 30m`).

use oldpho_core::Locale;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheConfig, EvictionStrategy};
use crate::resilience::RetryConfig;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment mode. Development enables the local echo provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("expected 'development' or 'production', got '{}'", other)),
        }
    }
}

/// Configuration for the restoration runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tasks allowed to run provider calls at once
    pub max_concurrent: usize,

    /// Extra full passes over the providers before a task is rejected
    pub max_retries: u32,

    /// How long a provider stays disabled after quota/rate-limit exhaustion
    #[serde(with = "humantime_serde")]
    pub provider_cooldown: Duration,

    /// Hard ceiling on a caller's wait for a result
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    pub retry: RetryConfig,
    pub cache: CacheConfig,

    /// Entries kept in the rolling error history
    pub error_history_capacity: usize,

    pub environment: Environment,
    pub locale: Locale,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retries: 3,
            provider_cooldown: Duration::from_secs(60),
            request_timeout: Duration::from_secs(300),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            error_history_capacity: 1000,
            environment: Environment::Production,
            locale: Locale::En,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup` (an environment stand-in).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().merge_lookup(lookup)
    }

    /// Parse YAML; missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Apply `OLDPHO_*` overrides on top of `self`.
    pub fn merge_lookup<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (var, v))
        };

        if let Some((var, v)) = get("OLDPHO_MAX_CONCURRENT") {
            self.max_concurrent = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_MAX_RETRIES") {
            self.max_retries = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_PROVIDER_COOLDOWN") {
            self.provider_cooldown = parse_duration(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_REQUEST_TIMEOUT") {
            self.request_timeout = parse_duration(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_RETRY_MAX") {
            self.retry.max_retries = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_RETRY_BASE_DELAY") {
            self.retry.base_delay = parse_duration(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_RETRY_MAX_DELAY") {
            self.retry.max_delay = parse_duration(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_RETRY_MULTIPLIER") {
            self.retry.multiplier = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_CACHE_MAX_SIZE") {
            self.cache.max_size = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_CACHE_TTL") {
            self.cache.default_ttl = parse_duration(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_CACHE_STRATEGY") {
            self.cache.strategy = parse_env::<EvictionStrategy>(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_CACHE_CLEANUP_INTERVAL") {
            self.cache.cleanup_interval = parse_duration(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_ERROR_HISTORY") {
            self.error_history_capacity = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_ENV") {
            self.environment = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("OLDPHO_LOCALE") {
            self.locale = parse_env(var, &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid("max_concurrent must be at least 1".into()));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("retry.max_retries must be at least 1".into()));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid("retry.multiplier must be >= 1.0".into()));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid(
                "retry.base_delay must not exceed retry.max_delay".into(),
            ));
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::Invalid("cache.max_size must be at least 1".into()));
        }
        if self.cache.cleanup_interval.is_zero() {
            return Err(ConfigError::Invalid("cache.cleanup_interval must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request_timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Serialize durations as humantime strings.
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
