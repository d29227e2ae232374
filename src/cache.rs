// Search result cache: the collaborator seam used by the aggregator plus an
// in-process implementation with TTLs, a byte budget and eviction policies.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

// Opaque byte cache keyed by request cache key
#[async_trait]
pub trait SearchCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()>;
}

// Freshness tier: searches departing within `within_days` keep results for
// `ttl_seconds`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TtlTier {
    pub within_days: i64,
    pub ttl_seconds: u64,
}

// Fares close to departure move fast, so they are cached for less time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlPolicy {
    pub tiers: Vec<TtlTier>,
    pub default_ttl_seconds: u64,
}

impl Default for CacheTtlPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                TtlTier { within_days: 3, ttl_seconds: 300 },
                TtlTier { within_days: 7, ttl_seconds: 900 },
                TtlTier { within_days: 30, ttl_seconds: 3600 },
            ],
            default_ttl_seconds: 3 * 3600,
        }
    }
}

impl CacheTtlPolicy {
    /// TTL for a search departing on `departure`, seen from `today`. Tiers
    /// are checked in order; the first one that covers the gap wins.
    pub fn ttl_for(&self, departure: NaiveDate, today: NaiveDate) -> Duration {
        let days = (departure - today).num_days();
        let seconds = self
            .tiers
            .iter()
            .find(|tier| days <= tier.within_days)
            .map_or(self.default_ttl_seconds, |tier| tier.ttl_seconds);
        Duration::from_secs(seconds)
    }
}

// Live counters for the cache
#[derive(Debug, Default)]
pub struct CacheStats {
    pub size_bytes: AtomicUsize,
    pub items_count: AtomicUsize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub eviction_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub rejected_count: AtomicUsize,
    pub average_lookup_time_ns: AtomicU64,
    pub total_lookups: AtomicUsize,
}

// Point in time copy of the counters
#[derive(Debug, Default, Clone)]
pub struct CacheStatsReport {
    pub size_bytes: usize,
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
    pub rejected_count: usize,
    pub average_lookup_time_ns: u64,
    pub total_lookups: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    LeastRecentlyUsed,
    LeastFrequentlyUsed,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size_mb: usize,
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 64,
            eviction_policy: EvictionPolicy::LeastRecentlyUsed,
        }
    }
}

pub fn calculate_item_size(key: &str, data: &[u8]) -> usize {
    key.len() + data.len() + std::mem::size_of::<Instant>()
}

struct CacheEntry {
    data: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
    access_count: usize,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

pub struct InMemorySearchCache {
    entries: DashMap<String, CacheEntry>,
    config: RwLock<CacheConfig>,
    stats: CacheStats,
}

impl Default for InMemorySearchCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl InMemorySearchCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config: RwLock::new(config),
            stats: CacheStats::default(),
        }
    }

    fn max_size_bytes(&self) -> usize {
        self.config.read().max_size_mb * 1024 * 1024
    }

    /// Returns a copy of the cached bytes when present and fresh. Expired
    /// entries are dropped on sight.
    pub fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        let started = Instant::now();
        self.stats.total_lookups.fetch_add(1, Ordering::SeqCst);

        let found = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.access_count += 1;
                entry.last_accessed = Instant::now();
                Some(entry.data.clone())
            }
            Some(_) => None,
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                self.record_lookup_time(started);
                return None;
            }
        };

        match found {
            Some(data) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                self.record_lookup_time(started);
                Some(data)
            }
            None => {
                // the entry guard is released before removal
                self.remove_entry(key, true);
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                self.record_lookup_time(started);
                None
            }
        }
    }

    /// Stores `data` under `key`, evicting entries until it fits. Returns
    /// false when a single item is larger than the whole budget.
    pub fn store(&self, key: &str, data: Vec<u8>, ttl: Duration) -> bool {
        let item_size = calculate_item_size(key, &data);
        let max_size_bytes = self.max_size_bytes();
        if item_size > max_size_bytes {
            self.stats.rejected_count.fetch_add(1, Ordering::SeqCst);
            debug!(key, item_size, max_size_bytes, "cache item rejected");
            return false;
        }

        while self.stats.size_bytes.load(Ordering::SeqCst) + item_size > max_size_bytes {
            if !self.evict_one() {
                break;
            }
        }

        // counters are raised before the entry becomes visible to removers
        self.stats.size_bytes.fetch_add(item_size, Ordering::SeqCst);
        self.stats.items_count.fetch_add(1, Ordering::SeqCst);

        let now = Instant::now();
        let replaced = self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                created_at: now,
                ttl,
                access_count: 0,
                last_accessed: now,
            },
        );
        if let Some(old) = replaced {
            self.stats
                .size_bytes
                .fetch_sub(calculate_item_size(key, &old.data), Ordering::SeqCst);
            self.stats.items_count.fetch_sub(1, Ordering::SeqCst);
        }
        true
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter().filter(|key| self.remove_entry(key, false)).count()
    }

    pub fn purge_expired(&self) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter().filter(|key| self.remove_entry(key, true)).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_eviction_policy(&self, policy: EvictionPolicy) {
        self.config.write().eviction_policy = policy;
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            size_bytes: self.stats.size_bytes.load(Ordering::SeqCst),
            items_count: self.stats.items_count.load(Ordering::SeqCst),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            eviction_count: self.stats.eviction_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            rejected_count: self.stats.rejected_count.load(Ordering::SeqCst),
            average_lookup_time_ns: self.stats.average_lookup_time_ns.load(Ordering::SeqCst),
            total_lookups: self.stats.total_lookups.load(Ordering::SeqCst),
        }
    }

    fn evict_one(&self) -> bool {
        let policy = self.config.read().eviction_policy;

        let victim = match policy {
            EvictionPolicy::LeastRecentlyUsed => self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_accessed)
                .map(|entry| entry.key().clone()),
            EvictionPolicy::LeastFrequentlyUsed => self
                .entries
                .iter()
                .min_by_key(|entry| (entry.value().access_count, entry.value().last_accessed))
                .map(|entry| entry.key().clone()),
            EvictionPolicy::OldestFirst => self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone()),
        };

        match victim {
            Some(key) => {
                self.remove_entry(&key, false);
                self.stats.eviction_count.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    fn remove_entry(&self, key: &str, expired: bool) -> bool {
        match self.entries.remove(key) {
            Some((key, entry)) => {
                self.stats
                    .size_bytes
                    .fetch_sub(calculate_item_size(&key, &entry.data), Ordering::SeqCst);
                self.stats.items_count.fetch_sub(1, Ordering::SeqCst);
                if expired {
                    self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
                }
                true
            }
            None => false,
        }
    }

    fn record_lookup_time(&self, started: Instant) {
        let duration_ns = started.elapsed().as_nanos() as u64;
        let total_lookups = self.stats.total_lookups.load(Ordering::SeqCst) as u64;
        let current_avg = self.stats.average_lookup_time_ns.load(Ordering::SeqCst);

        let new_avg = if total_lookups <= 1 {
            duration_ns
        } else {
            (current_avg * (total_lookups - 1) + duration_ns) / total_lookups
        };

        self.stats
            .average_lookup_time_ns
            .store(new_avg, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchCache for InMemorySearchCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
        if !self.store(key, value, ttl) {
            anyhow::bail!("cache rejected {key}: item exceeds capacity");
        }
        Ok(())
    }
}
