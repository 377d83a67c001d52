//! Record codec
//!
//! Turns a [`PropertyList`] into transport-safe bytes and back. Non-primitive
//! value kinds must be registered once per process with [`register_types`]
//! before the default codec will encode or decode them.

use crate::error::{NdsError, Result};
use crate::property::{PropertyList, ValueKind};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use tracing::info;

/// Non-primitive kinds the default registration makes available
pub const DEFAULT_REGISTERED_KINDS: [ValueKind; 5] = [
    ValueKind::Timestamp,
    ValueKind::ByteString,
    ValueKind::Key,
    ValueKind::BlobKey,
    ValueKind::GeoPoint,
];

static REGISTRY: OnceCell<TypeRegistry> = OnceCell::new();

/// Set of value kinds a codec accepts
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    kinds: HashSet<ValueKind>,
}

impl TypeRegistry {
    /// Registry with only primitive kinds
    pub fn primitives_only() -> Self {
        Self::default()
    }

    /// Registry with every kind in [`DEFAULT_REGISTERED_KINDS`]
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        for kind in DEFAULT_REGISTERED_KINDS {
            registry.register(kind);
        }
        registry
    }

    pub fn register(&mut self, kind: ValueKind) -> &mut Self {
        self.kinds.insert(kind);
        self
    }

    pub fn supports(&self, kind: ValueKind) -> bool {
        kind.is_primitive() || self.kinds.contains(&kind)
    }

    fn check(&self, record: &PropertyList) -> std::result::Result<(), (String, ValueKind)> {
        for property in record {
            let kind = property.value.kind();
            if !self.supports(kind) {
                return Err((property.name.clone(), kind));
            }
        }
        Ok(())
    }
}

/// Register the non-primitive value kinds with the process-wide registry.
///
/// Must be called before the first marshal or unmarshal through
/// [`BincodeCodec::new`]. Repeated calls are no-ops; the registry is
/// immutable once set.
pub fn register_types() -> &'static TypeRegistry {
    REGISTRY.get_or_init(|| {
        info!("Registering record codec value kinds");
        TypeRegistry::with_defaults()
    })
}

/// The process-wide registry, if [`register_types`] has run
pub fn registry() -> Option<&'static TypeRegistry> {
    REGISTRY.get()
}

/// Pluggable wire encoding for a single record
pub trait RecordCodec: Send + Sync {
    fn marshal(&self, record: &PropertyList) -> Result<Vec<u8>>;

    fn unmarshal(&self, data: &[u8]) -> Result<PropertyList>;
}

/// Default codec: bincode over the serde form of [`PropertyList`]
#[derive(Debug, Clone, Default)]
pub struct BincodeCodec {
    registry: Option<TypeRegistry>,
}

impl BincodeCodec {
    /// Codec backed by the process-wide registry
    pub fn new() -> Self {
        Self { registry: None }
    }

    /// Codec with its own registry, independent of process state
    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    fn registry(&self) -> Option<&TypeRegistry> {
        self.registry.as_ref().or_else(|| registry())
    }
}

impl RecordCodec for BincodeCodec {
    fn marshal(&self, record: &PropertyList) -> Result<Vec<u8>> {
        let registry = self.registry().ok_or_else(|| {
            NdsError::Encoding("Record codec used before register_types()".to_string())
        })?;
        registry.check(record).map_err(|(name, kind)| {
            NdsError::Encoding(format!("Property {} has unregistered type {}", name, kind))
        })?;
        bincode::serialize(record).map_err(|e| NdsError::Encoding(e.to_string()))
    }

    fn unmarshal(&self, data: &[u8]) -> Result<PropertyList> {
        let registry = self.registry().ok_or_else(|| {
            NdsError::Decoding("Record codec used before register_types()".to_string())
        })?;
        let record: PropertyList =
            bincode::deserialize(data).map_err(|e| NdsError::Decoding(e.to_string()))?;
        registry.check(&record).map_err(|(name, kind)| {
            NdsError::Decoding(format!("Property {} has unregistered type {}", name, kind))
        })?;
        Ok(record)
    }
}
