//! Authoritative store interface and backends
//!
//! The store is the source of truth. The orchestrator only requires batched
//! get/put/delete; each backend short-circuits empty batches itself.

pub mod memory;
pub mod neo4j;

use crate::error::Result;
use crate::key::Key;
use crate::property::PropertyList;
use async_trait::async_trait;

pub use memory::{MemoryDatastore, StoreStats};
pub use neo4j::{Neo4jDatastore, StoreConfig};

/// Batched operations of a strongly consistent key-value store
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Load records; missing records are `Err(NdsError::NotFound)` in their slot.
    /// An outer error means the whole batch failed in transport.
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Result<PropertyList>>>;

    /// Store records, allocating ids for incomplete keys; each slot holds the
    /// completed key or that record's error.
    async fn put_multi(&self, keys: &[Key], records: &[PropertyList]) -> Result<Vec<Result<Key>>>;

    /// Remove records; removing an absent record succeeds. Per-key failures
    /// are returned as [`crate::NdsError::Multi`].
    async fn delete_multi(&self, keys: &[Key]) -> Result<()>;
}
