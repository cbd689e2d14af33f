//! Credential handling for restoration backends.
//!
//! Provider tokens are wrapped in [`ApiCredential`] as soon as they are
//! read. The wrapper redacts itself in `Debug`/`Display`, zeroes memory on
//! drop (via `secrecy`), and must be exposed explicitly at the point of use.
//!
//! A provider without a credential is registered but never becomes
//! available for dispatch.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Read from an environment variable
    Environment,
    /// Provided programmatically (tests, embedders)
    Programmatic,
    /// Implied by development mode (local backend)
    Development,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
            CredentialSource::Development => write!(f, "development"),
        }
    }
}

/// A securely-stored provider credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a credential value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read a credential from the environment.
    ///
    /// Unset and blank variables both count as "no credential".
    pub fn from_env(env_var: &str, name: &'static str) -> Option<Self> {
        Self::from_lookup(env_var, name, |var| std::env::var(var).ok())
    }

    /// Read a credential through an arbitrary lookup function.
    pub fn from_lookup<F>(key: &str, name: &'static str, lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(key)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Self::new(v.trim(), CredentialSource::Environment, name))
    }

    /// Expose the value. Call only where the token is sent.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
