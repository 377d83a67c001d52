//! Authoritative store keys
//!
//! A key is a path of (kind, id) pairs scoped to a namespace. Keys have a
//! stable string encoding which the cache layer uses to derive cache keys.

use crate::error::{NdsError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier part of a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Not yet assigned; the store allocates an id on put
    Incomplete,
    /// Numeric id
    Int(i64),
    /// String name
    Name(String),
}

/// Key identifying one record in the authoritative store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    namespace: String,
    kind: String,
    id: KeyId,
    parent: Option<Box<Key>>,
}

impl Key {
    /// Create a key with a string name
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_id(kind, KeyId::Name(name.into()))
    }

    /// Create a key with a numeric id
    pub fn numbered(kind: impl Into<String>, id: i64) -> Self {
        Self::with_id(kind, KeyId::Int(id))
    }

    /// Create an incomplete key whose id is allocated by the store
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self::with_id(kind, KeyId::Incomplete)
    }

    fn with_id(kind: impl Into<String>, id: KeyId) -> Self {
        Self {
            namespace: String::new(),
            kind: kind.into(),
            id,
            parent: None,
        }
    }

    /// Set the parent key
    pub fn with_parent(mut self, parent: Key) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Set the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the key still needs an id
    pub fn is_incomplete(&self) -> bool {
        matches!(self.id, KeyId::Incomplete)
    }

    /// Copy of this key with the id replaced
    pub fn complete(&self, id: KeyId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }

    /// Whether the key is well formed.
    ///
    /// The kind must be non-empty, names non-empty and numeric ids non-zero.
    /// Every ancestor must be complete, valid and in the same namespace.
    /// Incomplete keys pass; callers that need a stored record check
    /// [`Key::is_incomplete`] separately.
    pub fn valid(&self) -> bool {
        if self.kind.is_empty() {
            return false;
        }
        match &self.id {
            KeyId::Name(name) if name.is_empty() => return false,
            KeyId::Int(0) => return false,
            _ => {}
        }
        match &self.parent {
            Some(parent) => {
                !parent.is_incomplete() && parent.namespace == self.namespace && parent.valid()
            }
            None => true,
        }
    }

    /// Stable, URL-safe string encoding of the key
    pub fn encode(&self) -> String {
        // Serializing plain strings, integers and enums cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Inverse of [`Key::encode`]
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| NdsError::Decoding(format!("Invalid key encoding: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NdsError::Decoding(format!("Invalid key payload: {}", e)))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        } else if !self.namespace.is_empty() {
            write!(f, "{}:", self.namespace)?;
        }
        match &self.id {
            KeyId::Incomplete => write!(f, "{},?", self.kind),
            KeyId::Int(id) => write!(f, "{},{}", self.kind, id),
            KeyId::Name(name) => write!(f, "{},{:?}", self.kind, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validity() {
        assert!(Key::named("Task", "task-001").valid());
        assert!(Key::numbered("Task", 42).valid());
        assert!(Key::incomplete("Task").valid());

        assert!(!Key::named("", "task-001").valid());
        assert!(!Key::named("Task", "").valid());
        assert!(!Key::numbered("Task", 0).valid());
    }

    #[test]
    fn test_key_parent_rules() {
        let parent = Key::named("Project", "ouroboros");
        assert!(Key::numbered("Task", 1).with_parent(parent.clone()).valid());

        let incomplete_parent = Key::incomplete("Project");
        assert!(!Key::numbered("Task", 1).with_parent(incomplete_parent).valid());

        let other_namespace = Key::numbered("Task", 1)
            .with_namespace("tenant-a")
            .with_parent(parent);
        assert!(!other_namespace.valid());
    }

    #[test]
    fn test_encode_decode() {
        let key = Key::named("Task", "task-001")
            .with_namespace("tenant-a")
            .with_parent(Key::numbered("Project", 7).with_namespace("tenant-a"));

        let encoded = key.encode();
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('+'));
        assert_eq!(Key::decode(&encoded).unwrap(), key);

        // Deterministic
        assert_eq!(encoded, key.clone().encode());
    }

    #[test]
    fn test_distinct_keys_encode_differently() {
        let a = Key::named("Task", "1");
        let b = Key::numbered("Task", 1);
        let c = Key::named("Task", "1").with_namespace("x");
        assert_ne!(a.encode(), b.encode());
        assert_ne!(a.encode(), c.encode());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Key::decode("%%%"), Err(NdsError::Decoding(_))));
        assert!(matches!(
            Key::decode(&URL_SAFE_NO_PAD.encode(b"not json")),
            Err(NdsError::Decoding(_))
        ));
    }

    #[test]
    fn test_complete_and_display() {
        let key = Key::incomplete("Task").with_parent(Key::named("Project", "p"));
        assert!(key.is_incomplete());
        assert_eq!(key.to_string(), "Project,\"p\"/Task,?");

        let done = key.complete(KeyId::Int(9));
        assert!(!done.is_incomplete());
        assert_eq!(done.to_string(), "Project,\"p\"/Task,9");
    }
}
