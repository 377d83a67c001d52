//! Cache service interface and the zero-length guard

use crate::cache::item::Item;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Batched operations of a memcache-style cache service.
///
/// Conditional writes report per-item failures as [`crate::NdsError::Multi`]
/// with [`crate::NdsError::NotStored`] or [`crate::NdsError::CasConflict`]
/// in the slots that were not written.
#[async_trait]
pub trait Memcache: Send + Sync {
    /// Fetch items by key; missing keys are absent from the map
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Item>>;

    /// Store each item only if its key holds nothing
    async fn add_multi(&self, items: &[Item]) -> Result<()>;

    /// Store each item only if its key still carries the item's `cas_id`
    async fn compare_and_swap_multi(&self, items: &[Item]) -> Result<()>;

    /// Store each item unconditionally
    async fn set_multi(&self, items: &[Item]) -> Result<()>;

    /// Remove items; missing keys are not an error
    async fn delete_multi(&self, keys: &[String]) -> Result<()>;
}

/// Wraps a cache service so empty batches never reach it
#[derive(Debug)]
pub struct ZeroGuard<M> {
    inner: Arc<M>,
}

impl<M> Clone for ZeroGuard<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Memcache> ZeroGuard<M> {
    pub fn new(inner: Arc<M>) -> Self {
        Self { inner }
    }

    /// The wrapped service
    pub fn inner(&self) -> &Arc<M> {
        &self.inner
    }
}

#[async_trait]
impl<M: Memcache> Memcache for ZeroGuard<M> {
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Item>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        self.inner.get_multi(keys).await
    }

    async fn add_multi(&self, items: &[Item]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.inner.add_multi(items).await
    }

    async fn compare_and_swap_multi(&self, items: &[Item]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.inner.compare_and_swap_multi(items).await
    }

    async fn set_multi(&self, items: &[Item]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.inner.set_multi(items).await
    }

    async fn delete_multi(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.inner.delete_multi(keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::item::LOCK_TTL;
    use crate::error::NdsError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every call it receives, and counts them
    #[derive(Default)]
    struct Unreachable {
        calls: AtomicUsize,
    }

    impl Unreachable {
        fn hit(&self) -> NdsError {
            self.calls.fetch_add(1, Ordering::SeqCst);
            NdsError::Cache("service called".to_string())
        }
    }

    #[async_trait]
    impl Memcache for Unreachable {
        async fn get_multi(&self, _keys: &[String]) -> Result<HashMap<String, Item>> {
            Err(self.hit())
        }

        async fn add_multi(&self, _items: &[Item]) -> Result<()> {
            Err(self.hit())
        }

        async fn compare_and_swap_multi(&self, _items: &[Item]) -> Result<()> {
            Err(self.hit())
        }

        async fn set_multi(&self, _items: &[Item]) -> Result<()> {
            Err(self.hit())
        }

        async fn delete_multi(&self, _keys: &[String]) -> Result<()> {
            Err(self.hit())
        }
    }

    #[tokio::test]
    async fn test_empty_batches_skip_the_service() {
        let guard = ZeroGuard::new(Arc::new(Unreachable::default()));

        assert!(guard.get_multi(&[]).await.unwrap().is_empty());
        guard.add_multi(&[]).await.unwrap();
        guard.compare_and_swap_multi(&[]).await.unwrap();
        guard.set_multi(&[]).await.unwrap();
        guard.delete_multi(&[]).await.unwrap();

        assert_eq!(guard.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_empty_batches_reach_the_service() {
        let guard = ZeroGuard::new(Arc::new(Unreachable::default()));
        let item = Item::lock("k".to_string(), LOCK_TTL);

        assert!(guard.get_multi(&["k".to_string()]).await.is_err());
        assert!(guard.add_multi(&[item.clone()]).await.is_err());
        assert!(guard.compare_and_swap_multi(&[item.clone()]).await.is_err());
        assert!(guard.set_multi(&[item]).await.is_err());
        assert!(guard.delete_multi(&["k".to_string()]).await.is_err());

        assert_eq!(guard.inner().calls.load(Ordering::SeqCst), 5);
    }
}
