//! In-process authoritative store
//!
//! Strongly consistent by construction (a single lock guards all records).
//! Counts calls and supports injected failures and read latency so the
//! protocol can be exercised under races and partial failures.

use crate::datastore::Datastore;
use crate::error::{MultiError, NdsError, Result};
use crate::key::{Key, KeyId};
use crate::property::PropertyList;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Call counters for [`MemoryDatastore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub get_calls: u64,
    pub put_calls: u64,
    pub delete_calls: u64,

    /// Keys requested across all gets
    pub keys_read: u64,
}

impl StoreStats {
    pub fn total_calls(&self) -> u64 {
        self.get_calls + self.put_calls + self.delete_calls
    }
}

#[derive(Default)]
struct Records {
    records: HashMap<Key, PropertyList>,
    next_id: i64,
    stats: StoreStats,
    failing: HashSet<Key>,
    unavailable: bool,
}

impl Records {
    fn check(&self, key: &Key) -> Result<()> {
        if self.failing.contains(key) {
            return Err(NdsError::Store(format!("Injected failure for {}", key)));
        }
        Ok(())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(NdsError::Store("Store unavailable".to_string()));
        }
        Ok(())
    }
}

/// Authoritative store held in process memory
#[derive(Default)]
pub struct MemoryDatastore {
    inner: RwLock<Records>,
    read_latency: Option<Duration>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every get response by `latency` after the records are read,
    /// widening the window between a load and its cache write-back
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    /// Make every operation on `key` fail with a store error
    pub async fn fail_key(&self, key: Key) {
        self.inner.write().await.failing.insert(key);
    }

    /// Make whole batches fail (or succeed again)
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().await.unavailable = unavailable;
    }

    /// Record stored under `key`, bypassing statistics
    pub async fn peek(&self, key: &Key) -> Option<PropertyList> {
        self.inner.read().await.records.get(key).cloned()
    }

    pub async fn stats(&self) -> StoreStats {
        self.inner.read().await.stats.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Result<PropertyList>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let loaded = {
            let mut inner = self.inner.write().await;
            inner.stats.get_calls += 1;
            inner.stats.keys_read += keys.len() as u64;
            inner.check_available()?;

            keys.iter()
                .map(|key| {
                    inner.check(key)?;
                    inner.records.get(key).cloned().ok_or(NdsError::NotFound)
                })
                .collect::<Vec<_>>()
        };

        if let Some(latency) = self.read_latency {
            tokio::time::sleep(latency).await;
        }

        debug!("Loaded {} keys from memory store", keys.len());
        Ok(loaded)
    }

    async fn put_multi(&self, keys: &[Key], records: &[PropertyList]) -> Result<Vec<Result<Key>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if keys.len() != records.len() {
            return Err(NdsError::LengthMismatch {
                keys: keys.len(),
                values: records.len(),
            });
        }

        let mut inner = self.inner.write().await;
        inner.stats.put_calls += 1;
        inner.check_available()?;

        let mut stored = Vec::with_capacity(keys.len());
        for (key, record) in keys.iter().zip(records) {
            if let Err(e) = inner.check(key) {
                stored.push(Err(e));
                continue;
            }
            let key = if key.is_incomplete() {
                inner.next_id += 1;
                key.complete(KeyId::Int(inner.next_id))
            } else {
                key.clone()
            };
            inner.records.insert(key.clone(), record.clone());
            stored.push(Ok(key));
        }

        debug!("Stored {} records in memory store", keys.len());
        Ok(stored)
    }

    async fn delete_multi(&self, keys: &[Key]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        inner.stats.delete_calls += 1;
        inner.check_available()?;

        let mut errors = MultiError::new(keys.len());
        for (i, key) in keys.iter().enumerate() {
            match inner.check(key) {
                Ok(()) => {
                    inner.records.remove(key);
                }
                Err(e) => errors.set(i, e),
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyValue;

    fn record(n: i64) -> PropertyList {
        PropertyList::new().with("n", PropertyValue::Int(n))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryDatastore::new();
        let keys = vec![Key::named("Task", "a"), Key::named("Task", "b")];

        let stored = store.put_multi(&keys, &[record(1), record(2)]).await.unwrap();
        assert_eq!(stored[0].as_ref().unwrap(), &keys[0]);

        let loaded = store.get_multi(&keys).await.unwrap();
        assert_eq!(loaded[1].as_ref().unwrap(), &record(2));

        store.delete_multi(&keys[..1]).await.unwrap();
        let loaded = store.get_multi(&keys).await.unwrap();
        assert!(matches!(loaded[0], Err(NdsError::NotFound)));
        assert!(loaded[1].is_ok());
    }

    #[tokio::test]
    async fn test_incomplete_keys_get_ids() {
        let store = MemoryDatastore::new();
        let keys = vec![Key::incomplete("Task"), Key::incomplete("Task")];

        let stored = store.put_multi(&keys, &[record(1), record(2)]).await.unwrap();
        let first = stored[0].as_ref().unwrap();
        let second = stored[1].as_ref().unwrap();

        assert!(!first.is_incomplete());
        assert_ne!(first, second);
        assert_eq!(store.peek(first).await, Some(record(1)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let store = MemoryDatastore::new();
        let key = Key::named("Task", "never");
        store.delete_multi(&[key.clone()]).await.unwrap();
        store.delete_multi(&[key]).await.unwrap();
        assert_eq!(store.stats().await.delete_calls, 2);
    }

    #[tokio::test]
    async fn test_empty_batches_are_not_counted() {
        let store = MemoryDatastore::new();
        assert!(store.get_multi(&[]).await.unwrap().is_empty());
        assert!(store.put_multi(&[], &[]).await.unwrap().is_empty());
        store.delete_multi(&[]).await.unwrap();
        assert_eq!(store.stats().await.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryDatastore::new();
        let good = Key::named("Task", "good");
        let bad = Key::named("Task", "bad");
        store.fail_key(bad.clone()).await;

        let stored = store
            .put_multi(&[good.clone(), bad.clone()], &[record(1), record(2)])
            .await
            .unwrap();
        assert!(stored[0].is_ok());
        assert!(matches!(stored[1], Err(NdsError::Store(_))));

        match store.delete_multi(&[good, bad]).await {
            Err(NdsError::Multi(errors)) => {
                assert!(errors.get(0).is_none());
                assert!(errors.get(1).is_some());
            }
            other => panic!("expected multi-error, got {:?}", other),
        }

        store.set_unavailable(true).await;
        assert!(store.get_multi(&[Key::named("Task", "x")]).await.is_err());
    }
}
