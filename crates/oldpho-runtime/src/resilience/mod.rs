//! Resilience patterns for oldpho-runtime.
//!
//! This module provides:
//! - Per-provider cooldown breaker for quota and rate-limit exhaustion
//! - Retry with exponential backoff, driven by error classification
//! - Provider success/failure/cost accounting
//! - A bounded error history with escalation

mod circuit_breaker;
mod history;
mod retry;
mod stats;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use history::{ErrorHistory, ErrorReporter, ErrorStats};
pub use retry::{RetryConfig, RetryManager};
pub use stats::{ProviderStats, ProviderStatsTracker};
