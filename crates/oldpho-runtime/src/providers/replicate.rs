//! Replicate provider (primary backend).
//!
//! Creates a prediction against a face-restoration model and waits for it
//! to reach a terminal state, polling the prediction URL when the API does
//! not finish within the synchronous `Prefer: wait` window.

use super::{secrets::ApiCredential, ProviderError, RestorationProvider};
use async_trait::async_trait;
use oldpho_core::RestoredImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the Replicate API token.
pub const REPLICATE_API_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// GFPGAN v1.4 face restoration.
const DEFAULT_MODEL_VERSION: &str =
    "0fbacf7afc6c144e5be9767cff80f25aff23e52b0708f17e20f9879b2f21516c";

/// Replicate restoration backend.
#[cfg_attr(not(feature = "replicate"), allow(dead_code))]
pub struct ReplicateProvider {
    credential: ApiCredential,
    base_url: String,
    model_version: String,
    poll_interval: Duration,
    timeout: Duration,
    #[cfg(feature = "replicate")]
    client: reqwest::Client,
}

impl std::fmt::Debug for ReplicateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model_version", &self.model_version)
            .finish()
    }
}

impl ReplicateProvider {
    pub fn new(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
            #[cfg(feature = "replicate")]
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    /// Upper bound on one prediction, polling included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg_attr(not(feature = "replicate"), allow(dead_code))]
    fn prediction_request(&self, image: &[u8]) -> PredictionRequest {
        PredictionRequest {
            version: self.model_version.clone(),
            input: PredictionInput {
                img: super::data_uri(image),
                version: "v1.4".to_string(),
                scale: 2,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest {
    version: String,
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    img: String,
    version: String,
    scale: u32,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "replicate"), allow(dead_code))]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "replicate"), allow(dead_code))]
struct PredictionUrls {
    get: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "replicate"), allow(dead_code))]
struct ReplicateError {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl Prediction {
    /// Resolve a terminal prediction into an image, or `None` while running.
    fn outcome(&self) -> Option<Result<RestoredImage, ProviderError>> {
        match self.status {
            PredictionStatus::Starting | PredictionStatus::Processing => None,
            PredictionStatus::Succeeded => Some(self.output_url().map(RestoredImage::new)),
            PredictionStatus::Failed => Some(Err(ProviderError::PredictionFailed(
                self.error
                    .clone()
                    .unwrap_or_else(|| format!("prediction {} failed", self.id)),
            ))),
            PredictionStatus::Canceled => Some(Err(ProviderError::PredictionFailed(format!(
                "prediction {} canceled",
                self.id
            )))),
        }
    }

    /// Models return either a single URL or a list of URLs.
    fn output_url(&self) -> Result<String, ProviderError> {
        match &self.output {
            Some(serde_json::Value::String(url)) => Ok(url.clone()),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .rev()
                .find_map(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| ProviderError::Parse("empty output list".to_string())),
            _ => Err(ProviderError::Parse(format!(
                "prediction {} succeeded without output",
                self.id
            ))),
        }
    }
}

#[cfg(feature = "replicate")]
impl ReplicateProvider {
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Prediction, ProviderError> {
        // SECURITY: the token is exposed only here
        let response = request
            .bearer_auth(self.credential.expose())
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
            let message = response
                .json::<ReplicateError>()
                .await
                .ok()
                .and_then(|e| e.detail.or(e.title))
                .unwrap_or_else(|| status.to_string());
            return Err(super::status_error(status.as_u16(), retry_after, message));
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn run_prediction(&self, image: &[u8]) -> Result<RestoredImage, ProviderError> {
        let create = self
            .client
            .post(format!("{}/predictions", self.base_url))
            .header("Prefer", "wait")
            .json(&self.prediction_request(image));
        let mut prediction = self.send(create).await?;

        loop {
            if let Some(outcome) = prediction.outcome() {
                return outcome;
            }
            let poll_url = prediction
                .urls
                .as_ref()
                .map(|u| u.get.clone())
                .unwrap_or_else(|| format!("{}/predictions/{}", self.base_url, prediction.id));

            tracing::debug!(prediction = %prediction.id, status = ?prediction.status, "Polling Replicate prediction");
            tokio::time::sleep(self.poll_interval).await;
            prediction = self.send(self.client.get(poll_url)).await?;
        }
    }
}

#[async_trait]
impl RestorationProvider for ReplicateProvider {
    #[cfg(feature = "replicate")]
    async fn restore(&self, image: &[u8]) -> Result<RestoredImage, ProviderError> {
        tokio::time::timeout(self.timeout, self.run_prediction(image))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
    }

    #[cfg(not(feature = "replicate"))]
    async fn restore(&self, _image: &[u8]) -> Result<RestoredImage, ProviderError> {
        Err(ProviderError::NotConfigured(
            "Replicate provider requires the 'replicate' feature".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "replicate"
    }
}
