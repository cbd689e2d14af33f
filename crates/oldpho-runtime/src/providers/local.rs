//! Local development provider.
//!
//! Performs no restoration: it validates the upload and echoes it back as a
//! `data:` URI. Only registered when the runtime runs in development mode.

use super::{ProviderError, RestorationProvider};
use async_trait::async_trait;
use oldpho_core::RestoredImage;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct LocalProvider {
    /// Simulated processing latency
    latency: Duration,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl RestorationProvider for LocalProvider {
    async fn restore(&self, image: &[u8]) -> Result<RestoredImage, ProviderError> {
        if image.is_empty() {
            return Err(ProviderError::InvalidImage("empty upload".to_string()));
        }
        if super::sniff_mime(image).is_none() {
            return Err(ProviderError::InvalidImage("unrecognized image data".to_string()));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(RestoredImage::new(super::data_uri(image)))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "local"
    }
}
