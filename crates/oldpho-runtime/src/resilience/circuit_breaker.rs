//! Per-provider cooldown breaker.
//!
//! A provider that reports quota or rate-limit exhaustion is benched for a
//! fixed cooldown. There is no failure counting and no half-open probe: the
//! first exhausting failure opens the circuit and the cooldown elapsing
//! closes it, whether or not any requests arrive in between.

use oldpho_core::ErrorCode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// State of one provider's circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitState {
    /// Provider may be called
    Closed,

    /// Provider is benched until `until`
    Open { until: Instant, reason: ErrorCode },
}

/// Cooldown breaker keyed by provider name.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether calls to `provider` are currently blocked.
    pub fn is_open(&self, provider: &str) -> bool {
        let states = self.states.read();
        match states.get(provider) {
            Some(CircuitState::Open { until, .. }) => {
                if Instant::now() >= *until {
                    drop(states);
                    self.close_if_expired(provider);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Bench `provider` for the cooldown window.
    ///
    /// Tripping an already-open circuit restarts the window.
    pub fn trip(&self, provider: &str, reason: ErrorCode) {
        let until = Instant::now() + self.cooldown;
        self.states
            .write()
            .insert(provider.to_string(), CircuitState::Open { until, reason });
        tracing::warn!(
            provider = %provider,
            reason = %reason,
            cooldown = ?self.cooldown,
            "Provider disabled for cooldown"
        );
    }

    fn close_if_expired(&self, provider: &str) {
        let mut states = self.states.write();
        if let Some(CircuitState::Open { until, .. }) = states.get(provider) {
            if Instant::now() >= *until {
                states.insert(provider.to_string(), CircuitState::Closed);
                tracing::info!(provider = %provider, "Provider cooldown elapsed, re-enabled");
            }
        }
    }

    /// Current state, with expiry applied.
    pub fn state(&self, provider: &str) -> CircuitState {
        if !self.is_open(provider) {
            return CircuitState::Closed;
        }
        self.states
            .read()
            .get(provider)
            .cloned()
            .unwrap_or(CircuitState::Closed)
    }

    /// Close every circuit (operator action).
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
