//! Statistics for the in-process cache service

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters for [`crate::cache::MemoryCache`]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Keys found by gets
    pub hits: u64,

    /// Keys missing (or expired) on gets
    pub misses: u64,

    /// Number of items currently held
    pub entries: usize,

    /// Total size of held keys and values in bytes
    pub size_bytes: usize,

    /// Items evicted to respect size bounds
    pub evictions_size: u64,

    /// Items dropped because their expiration passed
    pub evictions_ttl: u64,

    /// Batched calls received, per operation
    pub get_calls: u64,
    pub add_calls: u64,
    pub cas_calls: u64,
    pub set_calls: u64,
    pub delete_calls: u64,

    /// Items written by add-if-absent
    pub adds_stored: u64,

    /// Items written by compare-and-swap
    pub cas_stored: u64,

    /// Compare-and-swap attempts that lost a race or found nothing
    pub cas_rejected: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Batched calls of every kind
    pub fn total_calls(&self) -> u64 {
        self.get_calls + self.add_calls + self.cas_calls + self.set_calls + self.delete_calls
    }

    /// Calculate total evictions
    pub fn total_evictions(&self) -> u64 {
        self.evictions_size + self.evictions_ttl
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, size: {} bytes, calls: {}, evictions: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.size_bytes,
            self.total_calls(),
            self.total_evictions()
        )
    }
}
