//! # Cache Side of the Consistency Protocol
//!
//! Everything the orchestrator needs from the volatile cache:
//!
//! - **Items**: every cache slot holds nothing, an `entity` (serialized
//!   record), a `none` marker (record known absent) or a `lock` token
//! - **Key derivation**: store keys map into the `NDS1:` namespace, hashed
//!   with SHA-1 when too long for the cache service
//! - **Service interface**: the batched [`Memcache`] trait, wrapped in a
//!   [`ZeroGuard`] so empty batches never leave the process
//! - **In-process service**: [`MemoryCache`] with add-if-absent,
//!   compare-and-swap, expiry and LRU bounds
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_nds::cache::{cache_key, Item, Memcache, MemoryCache, LOCK_TTL};
//! use ouroboros_nds::Key;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = MemoryCache::default();
//! let slot = cache_key(&Key::named("Task", "task-001"));
//!
//! // Only the first add wins the slot
//! cache.add_multi(&[Item::lock(slot.clone(), LOCK_TTL)]).await?;
//! assert!(cache.add_multi(&[Item::lock(slot.clone(), LOCK_TTL)]).await.is_err());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod entry;
pub mod item;
pub mod key;
pub mod store;
pub mod types;

pub use client::{Memcache, ZeroGuard};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use item::{lock_token, Item, ItemState, LOCK_TTL};
pub use key::{cache_key, CACHE_KEY_PREFIX, MAX_CACHE_KEY_LEN};
pub use store::MemoryCache;
pub use types::CacheStats;
