//! Provider registry.
//!
//! Holds every configured backend in ascending priority order. Which of
//! them may be dispatched to is decided here: a provider is available iff
//! it has a credential and its cooldown circuit is closed.
//!
//! ## Usage
//!
//! ```ignore
//! let config = RuntimeConfig::from_env()?;
//! let registry = ProviderRegistry::from_config(&config);
//!
//! for provider in registry.available() {
//!     println!("{} (priority {})", provider.name(), provider.spec.priority);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use oldpho_core::{ErrorCode, ProviderInfo};
use thiserror::Error;

use super::{
    ApiCredential, CredentialSource, LocalProvider, OpenAiProvider, ProviderKind, ProviderSpec,
    ReplicateProvider, RestorationProvider, OPENAI_API_KEY_ENV, REPLICATE_API_TOKEN_ENV,
};
use crate::config::RuntimeConfig;
use crate::resilience::{CircuitBreaker, CircuitState};

/// Errors from registering providers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Provider '{0}' is already registered")]
    Duplicate(String),
}

/// Credentials for the network backends.
#[derive(Debug, Default)]
pub struct ProviderCredentials {
    pub replicate: Option<ApiCredential>,
    pub openai: Option<ApiCredential>,
}

impl ProviderCredentials {
    /// Read `REPLICATE_API_TOKEN` and `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            replicate: ApiCredential::from_lookup(
                REPLICATE_API_TOKEN_ENV,
                "Replicate API token",
                &lookup,
            ),
            openai: ApiCredential::from_lookup(OPENAI_API_KEY_ENV, "OpenAI API key", &lookup),
        }
    }
}

/// A provider that may be dispatched to right now.
#[derive(Clone)]
pub struct AvailableProvider {
    pub spec: ProviderSpec,
    pub backend: Arc<dyn RestorationProvider>,
}

impl AvailableProvider {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl std::fmt::Debug for AvailableProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailableProvider")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

struct Entry {
    spec: ProviderSpec,
    backend: Arc<dyn RestorationProvider>,

    /// Where the credential came from; `None` means never available
    credential: Option<CredentialSource>,
}

/// Ordered set of restoration backends with their cooldown state.
pub struct ProviderRegistry {
    entries: Vec<Entry>,
    breaker: CircuitBreaker,
}

impl ProviderRegistry {
    /// Empty registry whose tripped providers sit out `cooldown`.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: Vec::new(),
            breaker: CircuitBreaker::new(cooldown),
        }
    }

    /// Built-in backends, credentials read from the environment.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::with_credentials(config, ProviderCredentials::from_env())
    }

    /// Built-in backends with explicit credentials.
    ///
    /// Network backends without a credential are skipped. The local echo
    /// backend is only registered in development.
    pub fn with_credentials(config: &RuntimeConfig, mut credentials: ProviderCredentials) -> Self {
        let mut registry = Self::new(config.provider_cooldown);

        for kind in ProviderKind::ALL {
            let spec = kind.default_spec();
            let (backend, source): (Arc<dyn RestorationProvider>, CredentialSource) = match kind {
                ProviderKind::Replicate => match credentials.replicate.take() {
                    Some(credential) => {
                        let source = credential.source();
                        (Arc::new(ReplicateProvider::new(credential)), source)
                    }
                    None => {
                        tracing::info!(provider = %kind, "No Replicate API token, provider skipped");
                        continue;
                    }
                },
                ProviderKind::OpenAi => match credentials.openai.take() {
                    Some(credential) => {
                        let source = credential.source();
                        (Arc::new(OpenAiProvider::new(credential)), source)
                    }
                    None => {
                        tracing::info!(provider = %kind, "No OpenAI API key, provider skipped");
                        continue;
                    }
                },
                ProviderKind::Local => {
                    if !config.is_development() {
                        continue;
                    }
                    (Arc::new(LocalProvider::new()), CredentialSource::Development)
                }
            };
            registry.insert(spec, backend, Some(source));
        }

        tracing::debug!(providers = ?registry.names(), "Provider registry built");
        registry
    }

    /// Register a backend.
    ///
    /// `credential` is `None` for a backend that is known but unusable; it
    /// is listed in [`names`](Self::names) yet never available.
    pub fn register(
        &mut self,
        spec: ProviderSpec,
        backend: Arc<dyn RestorationProvider>,
        credential: Option<CredentialSource>,
    ) -> Result<(), RegistryError> {
        if self.entries.iter().any(|e| e.spec.name == spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        self.insert(spec, backend, credential);
        Ok(())
    }

    fn insert(
        &mut self,
        spec: ProviderSpec,
        backend: Arc<dyn RestorationProvider>,
        credential: Option<CredentialSource>,
    ) {
        // After any entry of equal priority, so registration order breaks ties
        let position = self
            .entries
            .iter()
            .position(|e| e.spec.priority > spec.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            Entry {
                spec,
                backend,
                credential,
            },
        );
    }

    /// Credentialed providers with a closed circuit, ascending priority.
    pub fn available(&self) -> Vec<AvailableProvider> {
        self.entries
            .iter()
            .filter(|e| e.credential.is_some() && !self.breaker.is_open(&e.spec.name))
            .map(|e| AvailableProvider {
                spec: e.spec.clone(),
                backend: e.backend.clone(),
            })
            .collect()
    }

    /// Public listing of [`available`](Self::available).
    pub fn available_providers(&self) -> Vec<ProviderInfo> {
        self.available()
            .into_iter()
            .map(|p| ProviderInfo {
                name: p.spec.name,
                priority: p.spec.priority,
                cost_per_request: p.spec.cost_per_request,
                rate_limit_per_minute: p.spec.rate_limit_per_minute,
            })
            .collect()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.spec.name == name && e.credential.is_some())
            && !self.breaker.is_open(name)
    }

    /// Bench a provider for the cooldown window.
    pub(crate) fn trip(&self, name: &str, reason: ErrorCode) {
        self.breaker.trip(name, reason);
    }

    pub fn circuit_state(&self, name: &str) -> CircuitState {
        self.breaker.state(name)
    }

    /// Re-enable every benched provider (operator action).
    pub fn reset_circuits(&self) {
        self.breaker.reset();
        tracing::info!("All provider circuits reset");
    }

    pub fn cooldown(&self) -> Duration {
        self.breaker.cooldown()
    }

    /// Every registered provider, ascending priority.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
