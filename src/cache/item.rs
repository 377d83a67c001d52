//! Cache items and their lock/entity states

use rand::Rng;
use std::time::Duration;

/// Maximum time a lock item lives in the cache.
///
/// Longer than the longest internal retry window of a store call, so a
/// crashed writer cannot leave a permanent lock.
pub const LOCK_TTL: Duration = Duration::from_secs(32);

/// State tag carried in an item's flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Store confirmed the record does not exist
    None,
    /// Serialized record believed current
    Entity,
    /// Write in flight or recently completed; do not trust the slot
    Lock,
}

impl ItemState {
    pub fn flags(&self) -> u32 {
        match self {
            ItemState::None => 0,
            ItemState::Entity => 1,
            ItemState::Lock => 2,
        }
    }

    /// Unknown flags are treated as a lock so they are never trusted
    pub fn from_flags(flags: u32) -> Self {
        match flags {
            0 => ItemState::None,
            1 => ItemState::Entity,
            _ => ItemState::Lock,
        }
    }
}

/// A cache item as exchanged with the cache service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub value: Vec<u8>,
    pub flags: u32,
    /// Zero means no expiry
    pub expiration: Duration,
    /// Opaque compare-and-swap token, populated by gets
    pub cas_id: Option<u64>,
}

impl Item {
    fn new(key: String, value: Vec<u8>, state: ItemState, expiration: Duration) -> Self {
        Self {
            key,
            value,
            flags: state.flags(),
            expiration,
            cas_id: None,
        }
    }

    /// Lock item with a fresh random token
    pub fn lock(key: String, ttl: Duration) -> Self {
        Self::new(key, lock_token().to_vec(), ItemState::Lock, ttl)
    }

    /// Entity item holding codec bytes
    pub fn entity(key: String, payload: Vec<u8>) -> Self {
        Self::new(key, payload, ItemState::Entity, Duration::ZERO)
    }

    /// Negative-cache item recording that the record does not exist
    pub fn none(key: String) -> Self {
        Self::new(key, Vec::new(), ItemState::None, Duration::ZERO)
    }

    /// Carry the compare-and-swap token observed on `observed`
    pub fn replacing(mut self, observed: &Item) -> Self {
        self.cas_id = observed.cas_id;
        self
    }

    pub fn state(&self) -> ItemState {
        ItemState::from_flags(self.flags)
    }
}

/// Four random bytes identifying one lock acquisition attempt
pub fn lock_token() -> [u8; 4] {
    rand::thread_rng().gen::<u32>().to_le_bytes()
}
