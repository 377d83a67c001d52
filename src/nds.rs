//! Consistency orchestrator
//!
//! Batched get/put/delete over an authoritative store with a cache in front.
//! Every cache slot is empty, an `entity`, a `none` marker or a `lock`:
//!
//! - Readers trust `entity` and `none` items. On a miss they race to add a
//!   lock, load from the store, then compare-and-swap the loaded record over
//!   the lock they observed. A reader that observed a lock before loading may
//!   swap over that lock too.
//! - Writers update the store first, then overwrite the slot with a fresh
//!   lock. Any reader whose load started before the write holds a stale
//!   compare-and-swap token and loses.
//!
//! Cache failures never fail an operation; the store is the only authority.

use crate::cache::{cache_key, Item, ItemState, Memcache, ZeroGuard, LOCK_TTL};
use crate::codec::{BincodeCodec, RecordCodec};
use crate::datastore::Datastore;
use crate::error::{MultiError, NdsError, Result};
use crate::key::Key;
use crate::property::{Entity, PropertyList};
use crate::validate::{check_keys, validate, KeyMode, ValueShape};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache-consistent access to a [`Datastore`] through a [`Memcache`]
pub struct Nds<D, M> {
    store: Arc<D>,
    cache: ZeroGuard<M>,
    codec: Arc<dyn RecordCodec>,
    lock_ttl: Duration,
}

impl<D, M> Nds<D, M>
where
    D: Datastore,
    M: Memcache + 'static,
{
    /// Orchestrator using the default record codec.
    ///
    /// [`crate::init`] must have been called before the first operation.
    pub fn new(store: Arc<D>, cache: Arc<M>) -> Self {
        Self::with_codec(store, cache, Arc::new(BincodeCodec::new()))
    }

    /// Orchestrator with a custom codec for cache payloads
    pub fn with_codec(store: Arc<D>, cache: Arc<M>, codec: Arc<dyn RecordCodec>) -> Self {
        Self {
            store,
            cache: ZeroGuard::new(cache),
            codec,
            lock_ttl: LOCK_TTL,
        }
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<M> {
        self.cache.inner()
    }

    /// Load records, one result slot per key.
    ///
    /// Missing records are `Err(NdsError::NotFound)` in their slot. Invalid
    /// or incomplete keys fail the whole call before any I/O.
    pub async fn get_multi<T: Entity>(&self, keys: &[Key]) -> Result<Vec<Result<T>>> {
        validate(keys, &ValueShape::sequence::<T>(keys.len()), KeyMode::Complete)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let cache_keys: Vec<String> = keys.iter().map(cache_key).collect();
        let mut results: Vec<Option<Result<PropertyList>>> = (0..keys.len()).map(|_| None).collect();

        // Lock items observed before the store load, by index
        let mut observed: HashMap<usize, Item> = HashMap::new();

        let cached = self.cache.get_multi(&cache_keys).await.unwrap_or_else(|e| {
            warn!("Cache get failed, falling back to store: {}", e);
            HashMap::new()
        });

        let mut missing = Vec::new();
        for (i, ck) in cache_keys.iter().enumerate() {
            let item = match cached.get(ck) {
                Some(item) => item,
                None => {
                    missing.push(i);
                    continue;
                }
            };
            match item.state() {
                ItemState::Entity => match self.codec.unmarshal(&item.value) {
                    Ok(record) => results[i] = Some(Ok(record)),
                    Err(e) => warn!("Discarding undecodable cache entry {}: {}", ck, e),
                },
                ItemState::None => results[i] = Some(Err(NdsError::NotFound)),
                ItemState::Lock => {
                    observed.insert(i, item.clone());
                }
            }
        }

        self.acquire_locks(&cache_keys, &missing, &mut observed).await;

        let pending: Vec<usize> = (0..keys.len()).filter(|&i| results[i].is_none()).collect();
        if !pending.is_empty() {
            let pending_keys: Vec<Key> = pending.iter().map(|&i| keys[i].clone()).collect();
            let loaded = self.store.get_multi(&pending_keys).await?;
            if loaded.len() != pending.len() {
                return Err(NdsError::Store(format!(
                    "Store returned {} results for {} keys",
                    loaded.len(),
                    pending.len()
                )));
            }

            let mut swaps = Vec::new();
            for (&i, record) in pending.iter().zip(loaded) {
                if let Some(lock) = observed.get(&i) {
                    if let Some(item) = self.write_back_item(&cache_keys[i], &record) {
                        swaps.push(item.replacing(lock));
                    }
                }
                results[i] = Some(record);
            }
            self.swap_in(swaps).await;
        }

        Ok(results
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(NdsError::NotFound)).and_then(T::load))
            .collect())
    }

    /// Store records and lock their cache slots, one result slot per key.
    ///
    /// Incomplete keys are completed by the store. A record that fails to
    /// save fails the whole call before any I/O.
    pub async fn put_multi<T: Entity>(&self, keys: &[Key], values: &[T]) -> Result<Vec<Result<Key>>> {
        validate(keys, &ValueShape::of(values), KeyMode::AllowIncomplete)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let records = values.iter().map(|value| value.save()).collect::<Result<Vec<_>>>()?;

        let complete = keys.iter().filter(|key| !key.is_incomplete());
        match self.store.put_multi(keys, &records).await {
            Ok(stored) => {
                let returned = stored.iter().filter_map(|slot| slot.as_ref().ok());
                self.lock(complete.chain(returned)).await;
                Ok(stored)
            }
            Err(e) => {
                self.lock(complete).await;
                Err(e)
            }
        }
    }

    /// Delete records and lock their cache slots.
    ///
    /// Deleting an absent record succeeds. Per-key store failures come back
    /// as [`NdsError::Multi`].
    pub async fn delete_multi(&self, keys: &[Key]) -> Result<()> {
        check_keys(keys, KeyMode::Complete)?;
        if keys.is_empty() {
            return Ok(());
        }

        let result = self.store.delete_multi(keys).await;
        self.lock(keys.iter()).await;
        result
    }

    /// Load a single record
    pub async fn get<T: Entity>(&self, key: &Key) -> Result<T> {
        single(self.get_multi(std::slice::from_ref(key)).await)
    }

    /// Store a single record, returning its completed key
    pub async fn put<T: Entity>(&self, key: &Key, value: T) -> Result<Key> {
        single(self.put_multi(std::slice::from_ref(key), std::slice::from_ref(&value)).await)
    }

    /// Delete a single record
    pub async fn delete(&self, key: &Key) -> Result<()> {
        self.delete_multi(std::slice::from_ref(key))
            .await
            .map_err(first_error)
    }

    /// Add lock items for cache misses and record the ones this call now holds
    async fn acquire_locks(
        &self,
        cache_keys: &[String],
        missing: &[usize],
        observed: &mut HashMap<usize, Item>,
    ) {
        let items: Vec<Item> = missing
            .iter()
            .map(|&i| Item::lock(cache_keys[i].clone(), self.lock_ttl))
            .collect();

        let added: Vec<usize> = match self.cache.add_multi(&items).await {
            Ok(()) => missing.to_vec(),
            Err(NdsError::Multi(errors)) => missing
                .iter()
                .zip(errors.iter())
                .filter(|(_, error)| error.is_none())
                .map(|(&i, _)| i)
                .collect(),
            Err(e) => {
                warn!("Cache add failed for {} keys: {}", items.len(), e);
                Vec::new()
            }
        };

        // Re-read to learn the compare-and-swap tokens of the new locks
        let added_keys: Vec<String> = added.iter().map(|&i| cache_keys[i].clone()).collect();
        match self.cache.get_multi(&added_keys).await {
            Ok(found) => {
                for i in added {
                    if let Some(item) = found.get(&cache_keys[i]) {
                        if item.state() == ItemState::Lock {
                            observed.insert(i, item.clone());
                        }
                    }
                }
            }
            Err(e) => warn!("Cache get of new locks failed: {}", e),
        }
    }

    /// Item to swap in after loading `record`, if it can be cached
    fn write_back_item(&self, cache_key: &str, record: &Result<PropertyList>) -> Option<Item> {
        match record {
            Ok(record) => match self.codec.marshal(record) {
                Ok(payload) => Some(Item::entity(cache_key.to_string(), payload)),
                Err(e) => {
                    warn!("Not caching {}: {}", cache_key, e);
                    None
                }
            },
            Err(NdsError::NotFound) => Some(Item::none(cache_key.to_string())),
            Err(_) => None,
        }
    }

    /// Compare-and-swap loaded records over observed locks.
    ///
    /// Runs on its own task so the cache is left consistent even when the
    /// caller stops waiting. Lost races are expected and not retried.
    async fn swap_in(&self, swaps: Vec<Item>) {
        if swaps.is_empty() {
            return;
        }

        let cache = self.cache.clone();
        let count = swaps.len();
        let task = tokio::spawn(async move { cache.compare_and_swap_multi(&swaps).await });

        match task.await {
            Ok(Ok(())) => debug!("Cached {} loaded records", count),
            Ok(Err(NdsError::Multi(errors))) => {
                debug!("Lost {}/{} cache write-back races", errors.error_count(), count)
            }
            Ok(Err(e)) => warn!("Cache write-back failed: {}", e),
            Err(e) => warn!("Cache write-back task failed: {}", e),
        }
    }

    /// Overwrite cache slots with fresh locks, best effort
    async fn lock<'a>(&self, keys: impl Iterator<Item = &'a Key>) {
        let mut items: Vec<Item> = keys
            .map(|key| Item::lock(cache_key(key), self.lock_ttl))
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items.dedup_by(|a, b| a.key == b.key);

        if let Err(e) = self.cache.set_multi(&items).await {
            warn!("Failed to lock {} cache keys: {}", items.len(), e);
        }
    }
}

/// The only slot of a single-key batch result
fn single<T>(result: Result<Vec<Result<T>>>) -> Result<T> {
    result
        .map_err(first_error)?
        .into_iter()
        .next()
        .unwrap_or_else(|| Err(NdsError::Other("Empty batch result".to_string())))
}

/// Unwrap a one-key multi-error into its error
fn first_error(err: NdsError) -> NdsError {
    match err {
        NdsError::Multi(errors) => errors
            .into_inner()
            .into_iter()
            .flatten()
            .next()
            .unwrap_or_else(|| NdsError::Multi(MultiError::new(0))),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::datastore::MemoryDatastore;
    use crate::property::{Property, PropertyValue};
    use crate::validate::ElementShape;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i64,
    }

    impl Entity for Counter {
        const SHAPE: ElementShape = ElementShape::LoadSaver;

        fn save(&self) -> Result<PropertyList> {
            Ok(PropertyList::new().with("value", PropertyValue::Int(self.value)))
        }

        fn load(properties: PropertyList) -> Result<Self> {
            match properties.get("value") {
                Some(PropertyValue::Int(value)) => Ok(Self { value: *value }),
                _ => Err(NdsError::Decoding("missing value".to_string())),
            }
        }
    }

    fn setup() -> Nds<MemoryDatastore, MemoryCache> {
        crate::init();
        Nds::new(Arc::new(MemoryDatastore::new()), Arc::new(MemoryCache::default()))
    }

    #[tokio::test]
    async fn test_cold_read_caches_entity() {
        let nds = setup();
        let key = Key::named("Counter", "c1");
        nds.store()
            .put_multi(&[key.clone()], &[Counter { value: 5 }.save().unwrap()])
            .await
            .unwrap();

        let counter: Counter = nds.get(&key).await.unwrap();
        assert_eq!(counter.value, 5);

        let item = nds.cache().peek(&cache_key(&key)).await.unwrap();
        assert_eq!(item.state(), ItemState::Entity);

        // Second read is served by the cache
        let again: Counter = nds.get(&key).await.unwrap();
        assert_eq!(again, counter);
        assert_eq!(nds.store().stats().await.get_calls, 1);
    }

    #[tokio::test]
    async fn test_put_locks_slot() {
        let nds = setup();
        let key = Key::named("Counter", "c1");

        nds.put(&key, Counter { value: 1 }).await.unwrap();
        let item = nds.cache().peek(&cache_key(&key)).await.unwrap();
        assert_eq!(item.state(), ItemState::Lock);
        assert_eq!(item.value.len(), 4);

        let counter: Counter = nds.get(&key).await.unwrap();
        assert_eq!(counter.value, 1);
        let item = nds.cache().peek(&cache_key(&key)).await.unwrap();
        assert_eq!(item.state(), ItemState::Entity);
    }

    #[tokio::test]
    async fn test_missing_record_is_negatively_cached() {
        let nds = setup();
        let key = Key::named("Counter", "missing");

        assert!(matches!(nds.get::<Counter>(&key).await, Err(NdsError::NotFound)));
        let item = nds.cache().peek(&cache_key(&key)).await.unwrap();
        assert_eq!(item.state(), ItemState::None);

        assert!(matches!(nds.get::<Counter>(&key).await, Err(NdsError::NotFound)));
        assert_eq!(nds.store().stats().await.get_calls, 1);
    }

    #[tokio::test]
    async fn test_undecodable_cache_entry_falls_through() {
        let nds = setup();
        let key = Key::named("Counter", "c1");
        nds.put(&key, Counter { value: 3 }).await.unwrap();
        nds.cache()
            .set_multi(&[Item::entity(cache_key(&key), vec![0xff, 0xff])])
            .await
            .unwrap();

        let counter: Counter = nds.get(&key).await.unwrap();
        assert_eq!(counter.value, 3);

        // No lock taken, so the garbage stays until a writer replaces it
        let stats = nds.cache().stats().await;
        assert_eq!(stats.add_calls, 0);
        assert_eq!(stats.cas_calls, 0);
    }

    #[tokio::test]
    async fn test_bare_property_lists_are_rejected() {
        let nds = setup();
        let key = Key::named("Counter", "c1");

        let err = nds.get::<PropertyList>(&key).await.unwrap_err();
        assert!(matches!(err, NdsError::UnsupportedShape(_)));

        let record = PropertyList::from(vec![Property::new("value", PropertyValue::Int(1))]);
        let err = nds.put(&key, record).await.unwrap_err();
        assert!(matches!(err, NdsError::UnsupportedShape(_)));
        assert_eq!(nds.store().stats().await.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_key_rules() {
        let nds = setup();

        let key = nds.put(&Key::incomplete("Counter"), Counter { value: 9 }).await.unwrap();
        assert!(!key.is_incomplete());
        let counter: Counter = nds.get(&key).await.unwrap();
        assert_eq!(counter.value, 9);

        let err = nds.get::<Counter>(&Key::incomplete("Counter")).await.unwrap_err();
        assert!(matches!(err, NdsError::InvalidKey));
        let err = nds.delete(&Key::incomplete("Counter")).await.unwrap_err();
        assert!(matches!(err, NdsError::InvalidKey));
    }

    #[tokio::test]
    async fn test_cache_outage_does_not_fail_reads() {
        crate::init();
        let nds = Nds::new(
            Arc::new(MemoryDatastore::new()),
            Arc::new(MemoryCache::new(
                crate::cache::CacheConfig::builder()
                    .max_entries(1)
                    .enable_lru_eviction(false)
                    .build(),
            )
            .unwrap()),
        );

        let keys = vec![Key::named("Counter", "a"), Key::named("Counter", "b")];
        nds.put_multi(&keys, &[Counter { value: 1 }, Counter { value: 2 }])
            .await
            .unwrap();

        let counters = nds.get_multi::<Counter>(&keys).await.unwrap();
        assert_eq!(counters[0].as_ref().unwrap().value, 1);
        assert_eq!(counters[1].as_ref().unwrap().value, 2);
    }

    #[test]
    fn test_first_error() {
        let mut errors = MultiError::new(1);
        errors.set(0, NdsError::InvalidKey);
        assert!(matches!(first_error(NdsError::Multi(errors)), NdsError::InvalidKey));
        assert!(matches!(first_error(NdsError::NotFound), NdsError::NotFound));
    }
}
