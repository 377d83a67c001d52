//! Batch argument validation
//!
//! Runs before any network call in every batch operation, so invalid input
//! never causes partial side effects.

use crate::error::{MultiError, NdsError, Result};
use crate::key::Key;
use crate::property::Entity;

/// How a batch element presents itself to the record layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShape {
    /// Hand-written load/save pair
    LoadSaver,
    /// Plain struct held by value
    Struct,
    /// Plain struct behind a pointer
    StructRef,
    /// Bare property list
    PropertyList,
    /// Anything else
    Other,
}

/// Shape of the values argument of a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A sequence of `len` elements
    Sequence { len: usize, element: ElementShape },
    /// A single value where a sequence was expected
    Single,
}

impl ValueShape {
    /// Shape of a slice of entities
    pub fn of<T: Entity>(values: &[T]) -> Self {
        Self::sequence::<T>(values.len())
    }

    /// Shape of a sequence of `len` entities of type `T`
    pub fn sequence<T: Entity>(len: usize) -> Self {
        ValueShape::Sequence {
            len,
            element: T::SHAPE,
        }
    }
}

/// Whether keys without an id are acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Lookups and deletes need a complete key
    Complete,
    /// Puts may leave id allocation to the store
    AllowIncomplete,
}

/// Check keys alone; returns a per-index multi-error when any key is invalid
pub fn check_keys(keys: &[Key], mode: KeyMode) -> Result<()> {
    let mut errors = MultiError::new(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let complete_enough = mode == KeyMode::AllowIncomplete || !key.is_incomplete();
        if !key.valid() || !complete_enough {
            errors.set(i, NdsError::InvalidKey);
        }
    }
    errors.into_result()
}

/// Check that `keys` and `values` form a valid batch.
///
/// In order: values must be a sequence, lengths must match, every key must be
/// valid (per-index [`NdsError::Multi`]), and the element shape must be one
/// the record layer can load and save.
pub fn validate(keys: &[Key], values: &ValueShape, mode: KeyMode) -> Result<()> {
    let (len, element) = match values {
        ValueShape::Sequence { len, element } => (*len, *element),
        ValueShape::Single => {
            return Err(NdsError::Shape("values is not a sequence".to_string()))
        }
    };

    if keys.len() != len {
        return Err(NdsError::LengthMismatch {
            keys: keys.len(),
            values: len,
        });
    }

    check_keys(keys, mode)?;

    match element {
        ElementShape::LoadSaver | ElementShape::Struct | ElementShape::StructRef => Ok(()),
        ElementShape::PropertyList => Err(NdsError::UnsupportedShape(
            "property lists are not supported as batch values".to_string(),
        )),
        ElementShape::Other => Err(NdsError::UnsupportedShape(
            "unsupported values type".to_string(),
        )),
    }
}
