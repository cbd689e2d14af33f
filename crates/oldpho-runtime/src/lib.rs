//! # oldpho-runtime
//!
//! Async restoration runtime for OldPho.
//!
//! This crate turns "image bytes + priority" into "restored image +
//! provider + cost + latency" despite individual provider failures:
//! - [`FallbackOrchestrator`]: priority queue, bounded concurrency and
//!   ordered provider fallback with task-level retries
//! - [`ProviderRegistry`]: the configured backends and their cooldown state
//! - [`SmartCache`]: TTL cache with LRU/LFU/FIFO/cost-based eviction, used
//!   by callers to skip repeated restorations
//! - [`RetryManager`]: classification-driven exponential backoff
//!
//! Nothing here is global. Construct the pieces once and share them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use oldpho_runtime::{FallbackOrchestrator, ProviderRegistry, RuntimeConfig, SmartCache};
//!
//! let config = RuntimeConfig::from_env()?;
//! let registry = ProviderRegistry::from_config(&config);
//! let orchestrator = FallbackOrchestrator::new(registry, config.clone())?;
//! let cache = SmartCache::new(config.cache.clone());
//!
//! let bytes = std::fs::read("grandma.jpg")?;
//! let result = cache
//!     .get_or_process(&oldpho_runtime::restoration_key(&bytes), None, 0.0, || {
//!         orchestrator.process_with_fallback(bytes.clone(), 5)
//!     })
//!     .await?;
//! println!("restored by {} for ${}", result.provider, result.cost);
//! ```

pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod queue;
pub mod resilience;

pub use cache::{
    fingerprint, restoration_key, CacheConfig, CacheError, CacheSnapshot, CacheStats,
    EvictionStrategy, SmartCache, SnapshotEntry,
};
pub use config::{ConfigError, Environment, RuntimeConfig};
pub use orchestrator::{
    FallbackOrchestrator, FallbackOrchestratorBuilder, OrchestratorError, RestorationHandle,
};
pub use providers::{
    ApiCredential, AvailableProvider, CredentialSource, ProviderCredentials, ProviderError,
    ProviderKind, ProviderRegistry, ProviderSpec, RegistryError, RestorationProvider,
};
pub use queue::RestorationRequest;
pub use resilience::{
    CircuitState, ErrorHistory, ErrorReporter, ErrorStats, ProviderStats, ProviderStatsTracker,
    RetryConfig, RetryManager,
};
