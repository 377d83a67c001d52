//! Stored cache entries with expiry and compare-and-swap ids

use crate::cache::item::Item;
use std::time::Duration;
use tokio::time::Instant;

/// An item as held by [`crate::cache::MemoryCache`]
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub flags: u32,

    /// Changes on every write to the key
    pub cas_id: u64,

    /// `None` for items without expiry
    pub expires_at: Option<Instant>,

    /// Approximate footprint of key, value and bookkeeping
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Build an entry from an item being written under `cas_id`
    pub fn from_item(item: &Item, cas_id: u64) -> Self {
        let expires_at = if item.expiration.is_zero() {
            None
        } else {
            Some(Instant::now() + item.expiration)
        };

        Self {
            value: item.value.clone(),
            flags: item.flags,
            cas_id,
            expires_at,
            size_bytes: item.key.len() + item.value.len() + std::mem::size_of::<Self>(),
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| Instant::now() >= at)
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Present the entry as an item carrying its cas id
    pub fn to_item(&self, key: &str) -> Item {
        Item {
            key: key.to_string(),
            value: self.value.clone(),
            flags: self.flags,
            expiration: self.time_until_expiration().unwrap_or(Duration::ZERO),
            cas_id: Some(self.cas_id),
        }
    }
}
