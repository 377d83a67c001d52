//! In-process cache service with memcache semantics
//!
//! Supports add-if-absent, compare-and-swap, item expiry and LRU bounds.
//! Used in tests and single-process deployments; every batched call is
//! counted in [`CacheStats`].

use crate::cache::{
    client::Memcache,
    config::CacheConfig,
    entry::CacheEntry,
    item::Item,
    types::CacheStats,
};
use crate::error::{MultiError, NdsError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Memcache-compatible cache held in process memory
pub struct MemoryCache {
    /// Cache configuration
    config: CacheConfig,

    /// Internal storage
    store: RwLock<CacheStore>,
}

/// Internal cache storage
struct CacheStore {
    /// Main storage: key -> entry
    entries: HashMap<String, CacheEntry>,

    /// LRU tracking: maintains access order
    lru_queue: VecDeque<String>,

    /// Current cache statistics
    stats: CacheStats,

    /// Total size of cached data in bytes
    current_size_bytes: usize,

    /// Source of compare-and-swap ids
    next_cas_id: u64,
}

impl CacheStore {
    /// Live entry for `key`, dropping it first if it has expired
    fn live(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.entries.get(key).map_or(false, CacheEntry::is_expired) {
            debug!("Cache entry expired: {}", key);
            self.remove_entry(key);
            self.stats.evictions_ttl += 1;
        }
        self.entries.get_mut(key)
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.current_size_bytes = self
            .current_size_bytes
            .saturating_sub(entry.size_bytes);
        self.stats.entries = self.entries.len();
        Some(entry)
    }

    fn insert_entry(&mut self, key: &str, entry: CacheEntry) {
        self.current_size_bytes += entry.size_bytes;
        self.entries.insert(key.to_string(), entry);
        self.touch(key);
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }
}

impl MemoryCache {
    /// Create a new cache, rejecting configurations with a zero bound
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: CacheConfig) -> Self {
        info!("Initializing memory cache with config: {:?}", config);

        let store = CacheStore {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: CacheStats::default(),
            current_size_bytes: 0,
            next_cas_id: 1,
        };

        Self {
            config,
            store: RwLock::new(store),
        }
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        store.stats.clone()
    }

    /// Current item for `key` without touching statistics or recency
    pub async fn peek(&self, key: &str) -> Option<Item> {
        let store = self.store.read().await;
        store
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.to_item(key))
    }

    /// Get number of entries in cache
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        let store = self.store.read().await;
        store.entries.is_empty()
    }

    /// Drop every item, simulating a cache flush
    pub async fn clear(&self) {
        let mut store = self.store.write().await;

        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        store.current_size_bytes = 0;
        store.stats.entries = 0;

        info!("Cleared {} entries from cache", count);
    }

    /// Internal: write `item` under a fresh cas id, evicting as needed.
    ///
    /// A refused write leaves the previous item for the key in place.
    fn write(&self, store: &mut CacheStore, item: &Item) -> Result<()> {
        let cas_id = store.next_cas_id;
        store.next_cas_id += 1;

        let entry = CacheEntry::from_item(item, cas_id);
        let previous = store.remove_entry(&item.key);
        if let Err(e) = self.evict_if_needed(store, entry.size_bytes) {
            if let Some(previous) = previous {
                store.insert_entry(&item.key, previous);
                self.update_stats(store);
            }
            return Err(e);
        }

        store.insert_entry(&item.key, entry);
        self.update_stats(store);
        Ok(())
    }

    /// Internal: Evict entries if needed to make room for new entry
    fn evict_if_needed(&self, store: &mut CacheStore, needed_size: usize) -> Result<()> {
        while store.entries.len() >= self.config.max_entries
            || store.current_size_bytes + needed_size > self.config.max_size_bytes
        {
            if !self.config.enable_lru_eviction {
                warn!("Cache bound reached with eviction disabled");
                return Err(NdsError::Cache("Cache size limit exceeded".to_string()));
            }
            match store.lru_queue.pop_front() {
                Some(key) => {
                    debug!("Evicting entry due to size limit: {}", key);
                    store.remove_entry(&key);
                    store.stats.evictions_size += 1;
                }
                None => {
                    // No more entries to evict, but still over limit
                    warn!("Cannot evict more entries, cache size limit exceeded");
                    return Err(NdsError::Cache("Cache size limit exceeded".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Internal: Update cache statistics
    fn update_stats(&self, store: &mut CacheStore) {
        store.stats.entries = store.entries.len();
        if self.config.enable_metrics {
            store.stats.size_bytes = store.current_size_bytes;
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_valid_config(CacheConfig::default())
    }
}

#[async_trait]
impl Memcache for MemoryCache {
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Item>> {
        let mut store = self.store.write().await;
        store.stats.get_calls += 1;

        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let item = store.live(key).map(|entry| entry.to_item(key));
            match item {
                Some(item) => {
                    debug!("Cache hit: {}", key);
                    store.stats.hits += 1;
                    if self.config.enable_lru_eviction {
                        store.touch(key);
                    }
                    found.insert(key.clone(), item);
                }
                None => {
                    debug!("Cache miss: {}", key);
                    store.stats.misses += 1;
                }
            }
        }
        Ok(found)
    }

    async fn add_multi(&self, items: &[Item]) -> Result<()> {
        let mut store = self.store.write().await;
        store.stats.add_calls += 1;

        let mut errors = MultiError::new(items.len());
        for (i, item) in items.iter().enumerate() {
            if store.live(&item.key).is_some() {
                errors.set(i, NdsError::NotStored);
                continue;
            }
            match self.write(&mut store, item) {
                Ok(()) => store.stats.adds_stored += 1,
                Err(e) => errors.set(i, e),
            }
        }
        errors.into_result()
    }

    async fn compare_and_swap_multi(&self, items: &[Item]) -> Result<()> {
        let mut store = self.store.write().await;
        store.stats.cas_calls += 1;

        let mut errors = MultiError::new(items.len());
        for (i, item) in items.iter().enumerate() {
            let current = store.live(&item.key).map(|entry| entry.cas_id);
            let outcome = match (current, item.cas_id) {
                (None, _) => Err(NdsError::NotStored),
                (Some(current), Some(expected)) if current == expected => {
                    self.write(&mut store, item)
                }
                _ => Err(NdsError::CasConflict),
            };
            match outcome {
                Ok(()) => store.stats.cas_stored += 1,
                Err(e) => {
                    store.stats.cas_rejected += 1;
                    errors.set(i, e);
                }
            }
        }
        errors.into_result()
    }

    async fn set_multi(&self, items: &[Item]) -> Result<()> {
        let mut store = self.store.write().await;
        store.stats.set_calls += 1;

        let mut errors = MultiError::new(items.len());
        for (i, item) in items.iter().enumerate() {
            if let Err(e) = self.write(&mut store, item) {
                errors.set(i, e);
            }
        }
        errors.into_result()
    }

    async fn delete_multi(&self, keys: &[String]) -> Result<()> {
        let mut store = self.store.write().await;
        store.stats.delete_calls += 1;

        for key in keys {
            if store.remove_entry(key).is_some() {
                debug!("Removed cache entry: {}", key);
            }
        }
        self.update_stats(&mut store);
        Ok(())
    }
}
