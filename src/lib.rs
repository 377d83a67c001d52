//! # Ouroboros NDS (ouroboros-nds)
//!
//! A strongly consistent cache layer in front of an authoritative key-value
//! store. Readers get cache speed; nobody ever observes a cached record that
//! is older than a completed write.
//!
//! ## Features
//!
//! - Batched get/put/delete with one result slot per key
//! - Lock/entity cache protocol built on add-if-absent and compare-and-swap
//! - Stampede protection: one reader per key repopulates the cache
//! - Negative caching of missing records
//! - Pluggable record codec and store/cache backends
//! - In-memory backends for tests, Neo4j for persistence
//!
//! ## Initialization
//!
//! The record codec must know the non-primitive value kinds (timestamps,
//! keys, geo points, blob keys, byte strings) before first use. Call
//! [`init`] once at startup:
//!
//! ```rust
//! ouroboros_nds::init();
//! ```
//!
//! ## Basic Usage
//!
//! ```rust
//! use ouroboros_nds::{impl_struct_entity, Key, MemoryCache, MemoryDatastore, Nds};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Task {
//!     title: String,
//!     priority: i64,
//! }
//!
//! impl_struct_entity!(Task);
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     ouroboros_nds::init();
//!     let nds = Nds::new(Arc::new(MemoryDatastore::new()), Arc::new(MemoryCache::default()));
//!
//!     let key = Key::named("Task", "task-001");
//!     nds.put(&key, Task { title: "Setup database".to_string(), priority: 1 }).await?;
//!
//!     let task: Task = nds.get(&key).await?;
//!     assert_eq!(task.priority, 1);
//!
//!     nds.delete(&key).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Neo4j Store
//!
//! ```no_run
//! use ouroboros_nds::{MemoryCache, Neo4jDatastore, Nds, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     ouroboros_nds::init();
//!     let store = Neo4jDatastore::connect(StoreConfig::from_env()).await?;
//!     store.health_check().await?;
//!
//!     let nds = Nds::new(Arc::new(store), Arc::new(MemoryCache::default()));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod datastore;
pub mod error;
pub mod key;
pub mod nds;
pub mod property;
pub mod validate;

// Re-export main types for convenience
pub use cache::{cache_key, CacheConfig, CacheStats, Item, ItemState, Memcache, MemoryCache, LOCK_TTL};
pub use codec::{register_types, BincodeCodec, RecordCodec, TypeRegistry};
pub use datastore::{Datastore, MemoryDatastore, Neo4jDatastore, StoreConfig, StoreStats};
pub use error::{MultiError, NdsError, Result};
pub use key::{Key, KeyId};
pub use nds::Nds;
pub use property::{
    load_struct, save_struct, Entity, GeoPoint, Property, PropertyList, PropertyValue, ValueKind,
};
pub use validate::{ElementShape, KeyMode, ValueShape};

/// Register the codec value kinds. Safe to call more than once.
pub fn init() {
    codec::register_types();
}
