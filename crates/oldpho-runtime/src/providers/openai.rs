//! OpenAI provider (secondary backend).
//!
//! Uses the image edit endpoint with a fixed restoration prompt.

use super::{secrets::ApiCredential, ProviderError, RestorationProvider};
use async_trait::async_trait;
use oldpho_core::RestoredImage;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-image-1";

const RESTORATION_PROMPT: &str = "Restore this old, damaged photograph. Remove scratches, \
     stains and noise, repair torn areas, sharpen faces and keep the original composition, \
     people and era-appropriate colors.";

/// OpenAI restoration backend.
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    model: String,
    timeout: Duration,
    #[cfg(feature = "openai")]
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            #[cfg(feature = "openai")]
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl ImagesResponse {
    #[cfg_attr(not(feature = "openai"), allow(dead_code))]
    fn into_image(self) -> Result<RestoredImage, ProviderError> {
        let first = self
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("no image in response".to_string()))?;

        match (first.b64_json, first.url) {
            (Some(b64), _) => Ok(RestoredImage::new(format!("data:image/png;base64,{}", b64))),
            (None, Some(url)) => Ok(RestoredImage::new(url)),
            (None, None) => Err(ProviderError::Parse("image has neither url nor data".to_string())),
        }
    }
}

#[async_trait]
impl RestorationProvider for OpenAiProvider {
    #[cfg(feature = "openai")]
    async fn restore(&self, image: &[u8]) -> Result<RestoredImage, ProviderError> {
        let mime = super::sniff_mime(image)
            .ok_or_else(|| ProviderError::InvalidImage("unrecognized image data".to_string()))?;
        let extension = mime.trim_start_matches("image/");

        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name(format!("photo.{}", extension))
            .mime_str(mime)
            .map_err(|e| ProviderError::InvalidImage(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("prompt", RESTORATION_PROMPT)
            .part("image", part);

        // SECURITY: the key is exposed only here
        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = match response.json::<OpenAiError>().await {
                Ok(body) if body.error.code.as_deref() == Some("insufficient_quota") => {
                    return Err(ProviderError::QuotaExceeded(body.error.message));
                }
                Ok(body) => body.error.message,
                Err(_) => status.to_string(),
            };
            return Err(super::status_error(status.as_u16(), retry_after, message));
        }

        response
            .json::<ImagesResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?
            .into_image()
    }

    #[cfg(not(feature = "openai"))]
    async fn restore(&self, _image: &[u8]) -> Result<RestoredImage, ProviderError> {
        Err(ProviderError::NotConfigured(
            "OpenAI provider requires the 'openai' feature".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}
