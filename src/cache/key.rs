//! Cache key derivation

use crate::key::Key;
use sha1::{Digest, Sha1};

/// Namespace for entity slots; must match across every participant sharing a cache
pub const CACHE_KEY_PREFIX: &str = "NDS1:";

/// Longest key the cache service accepts
pub const MAX_CACHE_KEY_LEN: usize = 250;

/// Derive the cache key for a store key.
///
/// Keys that would exceed [`MAX_CACHE_KEY_LEN`] are replaced by the hex SHA-1
/// of the full prefixed string (40 characters).
pub fn cache_key(key: &Key) -> String {
    let cache_key = format!("{}{}", CACHE_KEY_PREFIX, key.encode());
    if cache_key.len() > MAX_CACHE_KEY_LEN {
        hex::encode(Sha1::digest(cache_key.as_bytes()))
    } else {
        cache_key
    }
}
