//! Value types shared between the runtime and its callers.

use serde::{Deserialize, Serialize};

/// A restored image as returned by a provider.
///
/// `url` is either a remote URL or a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredImage {
    pub url: String,
}

impl RestoredImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Whether the image is inlined as a `data:` URI.
    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}

/// Outcome of a successful restoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub success: bool,
    pub result: Option<RestoredImage>,

    /// Provider that produced the result
    pub provider: String,

    /// Cost in USD charged by the provider
    pub cost: f64,

    /// From enqueue to completion, queue wait and failed passes included
    pub processing_time_millis: u64,
}

/// Snapshot of the orchestrator queue for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_length: usize,
    pub current_concurrent: usize,
    pub max_concurrent: usize,

    /// True while any task is admitted
    pub processing: bool,
}

/// Public view of an available provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub name: String,
    pub priority: u32,
    pub cost_per_request: f64,
    pub rate_limit_per_minute: u32,
}

/// Per-provider counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatsSnapshot {
    pub success: u64,
    pub failure: u64,
    pub total_cost: f64,
    pub success_rate: f64,
}
