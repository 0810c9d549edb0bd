//! Record cache with TTL
//!
//! Completed analyses keyed by canonical address: hex addresses fold case,
//! base-58 mints do not. A newer record for the same address replaces the old
//! one outright.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::models::AnalysisRecord;
use crate::config::CacheConfig;
use crate::detect::NetworkTag;

/// Cache key for an address
#[must_use]
pub fn cache_key(address: &str) -> String {
    NetworkTag::canonical(address)
}

struct CachedRecord {
    record: Arc<AnalysisRecord>,
    cached_at: Instant,
}

/// Thread-safe record cache
pub struct RecordCache {
    entries: DashMap<String, CachedRecord>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("size", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RecordCache {
    /// Create a cache
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Build from configuration; `None` when caching is disabled
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.ttl(), config.max_entries))
    }

    fn is_expired(&self, entry: &CachedRecord) -> bool {
        entry.cached_at.elapsed() > self.ttl
    }

    /// Cached record for `address`, if present and fresh
    pub fn get(&self, address: &str) -> Option<Arc<AnalysisRecord>> {
        let key = cache_key(address);
        if let Some(entry) = self.entries.get(&key) {
            if self.is_expired(&entry) {
                drop(entry);
                self.entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.record))
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Store `record`, replacing any previous one for the address
    pub fn insert(&self, record: Arc<AnalysisRecord>) {
        let key = cache_key(&record.address);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key,
            CachedRecord {
                record,
                cached_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().cached_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop expired entries
    pub fn evict_expired(&self) {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.cached_at.elapsed() <= ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Counters
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
            hit_rate,
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Fresh entries served
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries removed for age or capacity
    pub evictions: u64,
    /// Current size
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, name: &str) -> Arc<AnalysisRecord> {
        let mut r = AnalysisRecord::new(address);
        r.token = Some(super::super::models::TokenInfo {
            name: Some(name.to_string()),
            ..Default::default()
        });
        Arc::new(r)
    }

    const EVM: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    #[test]
    fn test_evm_lookup_is_case_insensitive() {
        let cache = RecordCache::new(Duration::from_secs(60), 10);
        cache.insert(record(EVM, "A"));

        assert_eq!(cache.get(&EVM.to_lowercase()).unwrap().name(), Some("A"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_solana_lookup_is_case_sensitive() {
        let cache = RecordCache::new(Duration::from_secs(60), 10);
        cache.insert(record(MINT, "A"));

        assert!(cache.get(&MINT.to_lowercase()).is_none());
        assert_eq!(cache.get(MINT).unwrap().name(), Some("A"));
        assert_eq!(cache_key(&MINT.to_uppercase()), MINT.to_uppercase());
    }

    #[test]
    fn test_newer_record_supersedes() {
        let cache = RecordCache::new(Duration::from_secs(60), 10);
        cache.insert(record(&EVM.to_lowercase(), "old"));
        cache.insert(record(EVM, "new"));

        assert_eq!(cache.stats().size, 1);
        assert_eq!(cache.get(EVM).unwrap().name(), Some("new"));
    }

    #[test]
    fn test_expiry() {
        let cache = RecordCache::new(Duration::from_millis(1), 10);
        cache.insert(record("a", "A"));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("a").is_none());
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = RecordCache::new(Duration::from_secs(60), 2);
        cache.insert(record("a", "A"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(record("b", "B"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(record("c", "C"));

        assert_eq!(cache.stats().size, 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_disabled_by_config() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(RecordCache::from_config(&config).is_none());
        assert!(RecordCache::from_config(&CacheConfig::default()).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = RecordCache::new(Duration::from_secs(60), 10);
        cache.insert(record("a", "A"));
        cache.clear();
        assert!(cache.get("a").is_none());
    }
}
