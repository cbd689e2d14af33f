//! Restoration backends.
//!
//! The set of built-in backends is closed ([`ProviderKind`]): Replicate is
//! the primary AI API, OpenAI the secondary, and a local echo backend exists
//! for development only. Each one implements [`RestorationProvider`]; the
//! [`ProviderRegistry`] holds them in priority order together with their
//! credentials and cooldown state.
//!
//! ## Security
//!
//! Credentials go through [`secrets::ApiCredential`] and are only exposed
//! when a request is sent.

use async_trait::async_trait;
use base64::Engine;
use oldpho_core::RestoredImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

mod local;
mod openai;
mod registry;
mod replicate;
pub mod secrets;

pub use local::LocalProvider;
pub use openai::{OpenAiProvider, OPENAI_API_KEY_ENV};
pub use registry::{AvailableProvider, ProviderCredentials, ProviderRegistry, RegistryError};
pub use replicate::{ReplicateProvider, REPLICATE_API_TOKEN_ENV};
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from restoration backends.
///
/// Messages are phrased so the error classifier maps each variant to the
/// right code (e.g. `QuotaExceeded` to `REPLICATE_QUOTA_EXCEEDED`).
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network request failed: {0}")]
    Http(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Processing failed: {0}")]
    PredictionFailed(String),

    #[error("Processing failed: unreadable provider response ({0})")]
    Parse(String),

    #[error("Invalid image format: {0}")]
    InvalidImage(String),

    #[error("Authentication failed")]
    Auth,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// The built-in backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Replicate,
    OpenAi,
    Local,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] =
        [ProviderKind::Replicate, ProviderKind::OpenAi, ProviderKind::Local];

    /// Static configuration of the backend.
    pub fn default_spec(&self) -> ProviderSpec {
        match self {
            ProviderKind::Replicate => ProviderSpec::new("replicate", 1)
                .with_cost(0.0023)
                .with_rate_limit(50),
            ProviderKind::OpenAi => ProviderSpec::new("openai", 2)
                .with_cost(0.04)
                .with_rate_limit(20),
            ProviderKind::Local => ProviderSpec::new("local", 3)
                .with_cost(0.0)
                .with_rate_limit(1000),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Replicate => "replicate",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Local => "local",
        })
    }
}

/// Static provider configuration.
///
/// Lower `priority` is tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub priority: u32,

    /// USD charged per successful request
    pub cost_per_request: f64,

    pub rate_limit_per_minute: u32,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            cost_per_request: 0.0,
            rate_limit_per_minute: 60,
        }
    }

    pub fn with_cost(mut self, cost_per_request: f64) -> Self {
        self.cost_per_request = cost_per_request;
        self
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }
}

/// A restoration backend.
///
/// Implementations perform one restoration attempt and report failures as
/// [`ProviderError`]; retrying and falling back are the orchestrator's job.
#[async_trait]
pub trait RestorationProvider: Send + Sync {
    /// Restore one image.
    async fn restore(&self, image: &[u8]) -> Result<RestoredImage, ProviderError>;

    /// Cheap readiness check (no network round-trip required).
    async fn health_check(&self) -> bool;

    /// Provider name for logs and stats.
    fn name(&self) -> &str;
}

/// Detect the MIME type of an image from its magic bytes.
pub fn sniff_mime(image: &[u8]) -> Option<&'static str> {
    match image {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        _ => None,
    }
}

/// Encode an image as a `data:` URI.
pub fn data_uri(image: &[u8]) -> String {
    let mime = sniff_mime(image).unwrap_or("application/octet-stream");
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(image)
    )
}

/// Map a non-success HTTP status to a provider error.
#[cfg_attr(not(any(feature = "replicate", feature = "openai")), allow(dead_code))]
pub(crate) fn status_error(
    status: u16,
    retry_after: Option<Duration>,
    message: String,
) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth,
        402 => ProviderError::QuotaExceeded(message),
        429 if message.to_ascii_lowercase().contains("quota") => {
            ProviderError::QuotaExceeded(message)
        }
        429 => ProviderError::RateLimited { retry_after },
        _ => ProviderError::Api { status, message },
    }
}
