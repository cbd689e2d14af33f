//! Smart cache for restoration results.
//!
//! A bounded key/value store with per-entry TTL, a pluggable eviction
//! strategy and hit/miss/cost accounting. Expired entries are dropped lazily
//! on access, before any eviction, and by the optional cleanup task.
//!
//! Recency and insertion order are tracked with a logical clock rather than
//! timestamps, so eviction order is exact even when many operations land in
//! the same instant.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::humantime_serde;

/// Access latency samples kept for [`CacheStats::average_access_micros`].
const LATENCY_SAMPLES: usize = 1000;

/// Errors from cache persistence hooks.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which entry to drop when the cache is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionStrategy {
    /// Least recently accessed
    #[default]
    Lru,

    /// Fewest accesses; ties go to the least recently accessed
    Lfu,

    /// Oldest insertion
    Fifo,

    /// Highest cost; ties go to the oldest insertion
    CostBased,
}

impl FromStr for EvictionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "fifo" => Ok(EvictionStrategy::Fifo),
            "cost" | "cost-based" | "cost_based" => Ok(EvictionStrategy::CostBased),
            other => Err(format!(
                "unknown eviction strategy '{}' (expected lru, lfu, fifo or cost-based)",
                other
            )),
        }
    }
}

/// Cache sizing and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,

    /// TTL applied when `set` is called without one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    pub strategy: EvictionStrategy,

    /// Period of the background purge started by `spawn_cleanup`
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl: Duration::from_secs(3600),
            strategy: EvictionStrategy::Lru,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,

    /// `hits / (hits + misses)`, 0 before any lookup
    pub hit_rate: f64,

    /// Summed cost of resident entries
    pub total_cost: f64,

    /// Mean `get` latency over the last 1000 lookups
    pub average_access_micros: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    cost: f64,
    inserted_tick: u64,
    accessed_tick: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.created_at))
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    tick: u64,
    latencies: VecDeque<Duration>,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            tick: 0,
            latencies: VecDeque::with_capacity(LATENCY_SAMPLES),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    fn victim(&self, strategy: EvictionStrategy) -> Option<String> {
        let entries = self.entries.iter();
        let victim = match strategy {
            EvictionStrategy::Lru => entries.min_by_key(|(_, e)| e.accessed_tick),
            EvictionStrategy::Lfu => entries.min_by_key(|(_, e)| (e.access_count, e.accessed_tick)),
            EvictionStrategy::Fifo => entries.min_by_key(|(_, e)| e.inserted_tick),
            EvictionStrategy::CostBased => entries.max_by(|(_, a), (_, b)| {
                a.cost
                    .total_cmp(&b.cost)
                    .then_with(|| b.inserted_tick.cmp(&a.inserted_tick))
            }),
        };
        victim.map(|(key, _)| key.clone())
    }

    /// Insert, making room first if `key` is new and the cache is full.
    ///
    /// A zero-capacity cache stores nothing.
    fn insert(&mut self, key: String, mut entry: CacheEntry<V>, config: &CacheConfig, now: Instant) -> bool {
        if config.max_size == 0 {
            tracing::debug!(key = %key, "Cache capacity is zero, entry not stored");
            return false;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= config.max_size {
            let purged = self.purge_expired(now);
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries to make room");
            }
            while self.entries.len() >= config.max_size {
                let Some(victim) = self.victim(config.strategy) else {
                    break;
                };
                self.entries.remove(&victim);
                tracing::debug!(key = %victim, strategy = ?config.strategy, "Evicted cache entry");
            }
        }
        let tick = self.next_tick();
        entry.inserted_tick = tick;
        entry.accessed_tick = tick;
        self.entries.insert(key, entry);
        true
    }

    fn record_latency(&mut self, elapsed: Duration) {
        if self.latencies.len() >= LATENCY_SAMPLES {
            self.latencies.pop_front();
        }
        self.latencies.push_back(elapsed);
    }
}

type Gates = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// A caller's hold on a per-key gate. The gate leaves the map with its last
/// holder, including callers dropped mid-wait or mid-producer.
struct GateLease<'a> {
    gates: &'a Gates,
    key: &'a str,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> GateLease<'a> {
    fn acquire(gates: &'a Gates, key: &'a str) -> Self {
        let gate = gates
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Self { gates, key, gate }
    }
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        // One reference in the map, one here
        if gates
            .get(self.key)
            .is_some_and(|g| Arc::strong_count(g) <= 2)
        {
            gates.remove(self.key);
        }
    }
}

/// Serializable image of the cache for external persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot<V> {
    pub entries: Vec<SnapshotEntry<V>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry<V> {
    pub key: String,
    pub value: V,

    /// TTL left at export time
    pub remaining_ttl_millis: u64,

    pub access_count: u64,
    pub cost: f64,
}

impl<V: Serialize> CacheSnapshot<V> {
    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<V: serde::de::DeserializeOwned> CacheSnapshot<V> {
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Bounded TTL cache with pluggable eviction.
///
/// Every operation completes under a single lock, so concurrent callers
/// always see `size() <= max_size`.
pub struct SmartCache<V> {
    config: CacheConfig,
    inner: Mutex<Inner<V>>,

    /// Per-key gates so `get_or_process` runs one producer per miss
    gates: Gates,
}

impl<V: Clone> SmartCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Insert or overwrite `key`. `ttl` defaults to the configured TTL.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>, cost: f64) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            ttl: ttl.unwrap_or(self.config.default_ttl),
            access_count: 0,
            cost,
            inserted_tick: 0,
            accessed_tick: 0,
        };
        self.inner.lock().insert(key.into(), entry, &self.config, now);
    }

    /// Look up `key`, counting a hit or a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let started = std::time::Instant::now();
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let value = Self::lookup(&mut inner, key, now);
        match value {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        inner.record_latency(started.elapsed());
        value
    }

    fn lookup(inner: &mut Inner<V>, key: &str, now: Instant) -> Option<V> {
        let expired = inner.entries.get(key)?.is_expired(now);
        if expired {
            inner.entries.remove(key);
            return None;
        }
        let tick = inner.next_tick();
        let entry = inner.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.accessed_tick = tick;
        Some(entry.value.clone())
    }

    /// Whether `key` is present and fresh. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop every entry and reset the statistics.
    pub fn clear(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Remove expired entries now. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired(Instant::now())
    }

    pub fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        let average_access_micros = if inner.latencies.is_empty() {
            0.0
        } else {
            let total: Duration = inner.latencies.iter().sum();
            total.as_secs_f64() * 1_000_000.0 / inner.latencies.len() as f64
        };

        CacheStats {
            size: inner.entries.len(),
            max_size: self.config.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            total_cost: inner.entries.values().map(|e| e.cost).sum(),
            average_access_micros,
        }
    }

    /// Cache-aside lookup.
    ///
    /// On a miss `producer` runs and its value is stored. Concurrent callers
    /// for the same key wait for that one producer instead of running their
    /// own. Producer errors are returned and nothing is cached.
    pub async fn get_or_process<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        cost: f64,
        producer: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let lease = GateLease::acquire(&self.gates, key);
        let guard = lease.gate.lock().await;

        // Another caller may have filled the entry while we waited
        let cached = {
            let mut inner = self.inner.lock();
            let value = Self::lookup(&mut inner, key, Instant::now());
            if value.is_some() {
                inner.hits += 1;
            }
            value
        };

        let result = match cached {
            Some(value) => Ok(value),
            None => match producer().await {
                Ok(value) => {
                    self.set(key, value.clone(), ttl, cost);
                    Ok(value)
                }
                Err(e) => Err(e),
            },
        };

        drop(guard);
        result
    }

    /// Snapshot of every fresh entry with its remaining TTL.
    pub fn export(&self) -> CacheSnapshot<V> {
        let now = Instant::now();
        let inner = self.inner.lock();
        let mut entries: Vec<_> = inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(key, e)| {
                (
                    e.inserted_tick,
                    SnapshotEntry {
                        key: key.clone(),
                        value: e.value.clone(),
                        remaining_ttl_millis: e.remaining_ttl(now).as_millis() as u64,
                        access_count: e.access_count,
                        cost: e.cost,
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(tick, _)| *tick);
        CacheSnapshot {
            entries: entries.into_iter().map(|(_, e)| e).collect(),
        }
    }

    /// Load a snapshot, oldest entry first, respecting `max_size`.
    ///
    /// Entries with no TTL left are skipped. Returns how many were loaded.
    pub fn import(&self, snapshot: CacheSnapshot<V>) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut imported = 0;
        for item in snapshot.entries {
            if item.remaining_ttl_millis == 0 {
                continue;
            }
            let entry = CacheEntry {
                value: item.value,
                created_at: now,
                ttl: Duration::from_millis(item.remaining_ttl_millis),
                access_count: item.access_count,
                cost: item.cost,
                inserted_tick: 0,
                accessed_tick: 0,
            };
            if inner.insert(item.key, entry, &self.config, now) {
                imported += 1;
            }
        }
        tracing::info!(imported, "Imported cache snapshot");
        imported
    }
}

impl<V: Clone + Send + Sync + 'static> SmartCache<V> {
    /// Purge expired entries every `cleanup_interval` until the cache is
    /// dropped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Cache cleanup removed expired entries");
                }
            }
        })
    }
}

impl<V: Clone> Default for SmartCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Hex SHA-256 of the image bytes.
pub fn fingerprint(image: &[u8]) -> String {
    hex::encode(Sha256::digest(image))
}

/// Cache key for a restoration of `image`. Independent of priority.
pub fn restoration_key(image: &[u8]) -> String {
    format!("restore:{}", fingerprint(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(max_size: usize, strategy: EvictionStrategy) -> SmartCache<String> {
        SmartCache::new(CacheConfig {
            max_size,
            strategy,
            ..Default::default()
        })
    }

    fn set(cache: &SmartCache<String>, key: &str) {
        cache.set(key, key.to_uppercase(), None, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = cache(10, EvictionStrategy::Lru);
        cache.set("k", "v".to_string(), Some(Duration::from_millis(100)), 0.0);
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_lru_evicts_least_recently_accessed() {
        let cache = cache(2, EvictionStrategy::Lru);
        set(&cache, "a");
        set(&cache, "b");
        cache.get("a");
        set(&cache, "c");

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[test]
    fn test_lfu_evicts_least_frequently_accessed() {
        let cache = cache(2, EvictionStrategy::Lfu);
        set(&cache, "a");
        set(&cache, "b");
        cache.get("a");
        cache.get("a");
        cache.get("b");
        set(&cache, "c");

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
    }

    #[test]
    fn test_fifo_ignores_access() {
        let cache = cache(2, EvictionStrategy::Fifo);
        set(&cache, "a");
        set(&cache, "b");
        cache.get("a");
        set(&cache, "c");

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
    }

    #[test]
    fn test_cost_based_evicts_highest_cost() {
        let cache = cache(2, EvictionStrategy::CostBased);
        cache.set("cheap", "x".to_string(), None, 0.0023);
        cache.set("pricey", "y".to_string(), None, 0.04);
        cache.set("new", "z".to_string(), None, 0.01);

        assert!(cache.has("cheap"));
        assert!(!cache.has("pricey"));
        assert!(cache.has("new"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = cache(2, EvictionStrategy::Lru);
        set(&cache, "a");
        set(&cache, "b");
        cache.set("a", "again".to_string(), None, 0.0);

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("again"));
        assert!(cache.has("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_make_room_before_eviction() {
        let cache = cache(2, EvictionStrategy::Lru);
        cache.set("short", "s".to_string(), Some(Duration::from_millis(10)), 0.0);
        set(&cache, "long");
        tokio::time::advance(Duration::from_millis(20)).await;
        set(&cache, "new");

        assert!(cache.has("long"));
        assert!(cache.has("new"));
    }

    #[test]
    fn test_stats() {
        let cache = cache(10, EvictionStrategy::Lru);
        cache.set("a", "1".to_string(), None, 0.5);
        cache.set("b", "2".to_string(), None, 0.25);
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let stats = cache.get_stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.total_cost - 0.75).abs() < 1e-9);

        cache.clear();
        let stats = cache.get_stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_has_and_delete_do_not_touch_stats() {
        let cache = cache(10, EvictionStrategy::Lru);
        set(&cache, "a");
        assert!(cache.has("a"));
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.get_stats().hits + cache.get_stats().misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_process_runs_producer_once() {
        let cache = SmartCache::<String>::default();
        let calls = AtomicUsize::new(0);
        let producer = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, std::io::Error>("restored".to_string())
        };

        let (a, b) = tokio::join!(
            cache.get_or_process("img", None, 0.0023, producer),
            cache.get_or_process("img", None, 0.0023, producer),
        );
        assert_eq!(a.unwrap(), "restored");
        assert_eq!(b.unwrap(), "restored");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let again = cache
            .get_or_process("img", None, 0.0023, || async {
                Err::<String, _>(std::io::Error::other("must not run"))
            })
            .await;
        assert_eq!(again.unwrap(), "restored");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_get_or_process_releases_gate() {
        let cache = SmartCache::<String>::default();
        let pending = cache.get_or_process("img", None, 0.0, || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, std::io::Error>("late".to_string())
        });
        let outcome = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(outcome.is_err());
        assert!(cache.gates.lock().is_empty());
        assert!(!cache.has("img"));

        let value = cache
            .get_or_process("img", None, 0.0, || async {
                Ok::<_, std::io::Error>("fresh".to_string())
            })
            .await;
        assert_eq!(value.unwrap(), "fresh");
        assert!(cache.gates.lock().is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = cache(0, EvictionStrategy::Lru);
        set(&cache, "a");
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.import(CacheSnapshot {
            entries: vec![SnapshotEntry {
                key: "b".to_string(),
                value: "B".to_string(),
                remaining_ttl_millis: 1000,
                access_count: 0,
                cost: 0.0,
            }],
        }), 0);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn test_get_or_process_error_is_not_cached() {
        let cache = SmartCache::<String>::default();
        let result = cache
            .get_or_process("img", None, 0.0, || async {
                Err::<String, _>(std::io::Error::other("provider down"))
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.has("img"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_import_keeps_remaining_ttl() {
        let source = cache(10, EvictionStrategy::Lru);
        source.set("a", "1".to_string(), Some(Duration::from_secs(10)), 0.1);
        source.set("b", "2".to_string(), Some(Duration::from_secs(1)), 0.2);
        source.get("a");
        tokio::time::advance(Duration::from_secs(4)).await;

        let json = source.export().to_json().unwrap();
        let snapshot = CacheSnapshot::<String>::from_json(&json).unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].remaining_ttl_millis, 6000);
        assert_eq!(snapshot.entries[0].access_count, 1);

        let target = cache(10, EvictionStrategy::Lru);
        assert_eq!(target.import(snapshot), 1);
        assert_eq!(target.get("a").as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(!target.has("a"));
    }

    #[test]
    fn test_import_respects_capacity() {
        let source = cache(10, EvictionStrategy::Fifo);
        for key in ["a", "b", "c"] {
            set(&source, key);
        }
        let target = cache(2, EvictionStrategy::Fifo);
        assert_eq!(target.import(source.export()), 3);
        assert_eq!(target.size(), 2);
        assert!(!target.has("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_purges_and_stops_on_drop() {
        let cache = Arc::new(SmartCache::<String>::new(CacheConfig {
            cleanup_interval: Duration::from_secs(1),
            ..Default::default()
        }));
        cache.set("k", "v".to_string(), Some(Duration::from_millis(500)), 0.0);
        let handle = cache.spawn_cleanup();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(cache.size(), 0);

        drop(cache);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(restoration_key(b"abc").starts_with("restore:ba7816bf"));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("LRU".parse::<EvictionStrategy>(), Ok(EvictionStrategy::Lru));
        assert_eq!("cost_based".parse::<EvictionStrategy>(), Ok(EvictionStrategy::CostBased));
        assert!("random".parse::<EvictionStrategy>().is_err());
    }

    fn strategy() -> impl Strategy<Value = EvictionStrategy> {
        prop_oneof![
            Just(EvictionStrategy::Lru),
            Just(EvictionStrategy::Lfu),
            Just(EvictionStrategy::Fifo),
            Just(EvictionStrategy::CostBased),
        ]
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_max(
            max_size in 0usize..6,
            strategy in strategy(),
            ops in prop::collection::vec((0u8..12, any::<bool>(), 0.0f64..1.0), 1..80),
        ) {
            let cache = cache(max_size, strategy);
            for (key, read, cost) in ops {
                let key = format!("k{}", key);
                if read {
                    cache.get(&key);
                } else {
                    cache.set(key, "v".to_string(), None, cost);
                    prop_assert!(cache.size() <= max_size);
                }
            }
        }
    }
}
