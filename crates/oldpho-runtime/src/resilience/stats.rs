//! Per-provider success, failure and cost accounting.

use oldpho_core::ProviderStatsSnapshot;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub provider_name: String,
    pub success_count: u64,
    pub failure_count: u64,

    /// Accumulated USD cost of successful calls
    pub total_cost: f64,
}

impl ProviderStats {
    fn new(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            ..Default::default()
        }
    }

    /// `success / (success + failure)`, or 0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        let attempts = self.success_count + self.failure_count;
        if attempts == 0 {
            0.0
        } else {
            self.success_count as f64 / attempts as f64
        }
    }

    pub fn snapshot(&self) -> ProviderStatsSnapshot {
        ProviderStatsSnapshot {
            success: self.success_count,
            failure: self.failure_count,
            total_cost: self.total_cost,
            success_rate: self.success_rate(),
        }
    }
}

/// Stats for every provider the orchestrator has called.
///
/// Each update happens under one write lock, so counters and cost never
/// drift apart.
#[derive(Default)]
pub struct ProviderStatsTracker {
    stats: RwLock<BTreeMap<String, ProviderStats>>,
}

impl ProviderStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a provider show up with zeroed counters before its first call.
    pub fn register(&self, provider: &str) {
        self.stats
            .write()
            .entry(provider.to_string())
            .or_insert_with(|| ProviderStats::new(provider));
    }

    pub fn record_success(&self, provider: &str, cost: f64) {
        let mut stats = self.stats.write();
        let entry = stats
            .entry(provider.to_string())
            .or_insert_with(|| ProviderStats::new(provider));
        entry.success_count += 1;
        entry.total_cost += cost;
    }

    /// Failed calls are recorded with zero cost.
    pub fn record_failure(&self, provider: &str) {
        let mut stats = self.stats.write();
        let entry = stats
            .entry(provider.to_string())
            .or_insert_with(|| ProviderStats::new(provider));
        entry.failure_count += 1;
    }

    pub fn get(&self, provider: &str) -> Option<ProviderStats> {
        self.stats.read().get(provider).cloned()
    }

    /// Public view keyed by provider name.
    pub fn snapshot(&self) -> BTreeMap<String, ProviderStatsSnapshot> {
        self.stats
            .read()
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect()
    }

    /// Total spend across providers.
    pub fn total_cost(&self) -> f64 {
        self.stats.read().values().map(|s| s.total_cost).sum()
    }

    /// Zero every counter (operator action).
    pub fn reset(&self) {
        for stats in self.stats.write().values_mut() {
            *stats = ProviderStats::new(&stats.provider_name);
        }
    }
}
