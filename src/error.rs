//! Error types for cache-consistent datastore operations
//!
//! Validation errors abort a batch before any network call. Per-key failures
//! are reported positionally through [`MultiError`].

use std::fmt;
use thiserror::Error;

/// Main error type for ouroboros-nds operations
#[derive(Error, Debug)]
pub enum NdsError {
    /// The values argument is not a sequence
    #[error("Shape error: {0}")]
    Shape(String),

    /// Keys and values have different lengths
    #[error("Length mismatch: {keys} keys but {values} values")]
    LengthMismatch { keys: usize, values: usize },

    /// Key is absent, malformed, or incomplete where a complete key is required
    #[error("Invalid key")]
    InvalidKey,

    /// The value container holds a shape that cannot be loaded or saved
    #[error("Unsupported shape: {0}")]
    UnsupportedShape(String),

    /// No entity exists for the key
    #[error("No such entity")]
    NotFound,

    /// Record could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Record bytes could not be decoded
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Cache refused a conditional write because the item exists (add) or is gone (swap)
    #[error("Cache item not stored")]
    NotStored,

    /// Cache compare-and-swap lost against a concurrent modification
    #[error("Cache compare-and-swap conflict")]
    CasConflict,

    /// Authoritative store transport failure
    #[error("Store error: {0}")]
    Store(String),

    /// Cache service transport failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Connection error - network or connection pool issues
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Per-index errors for a batch
    #[error("{0}")]
    Multi(MultiError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for ouroboros-nds operations
pub type Result<T> = std::result::Result<T, NdsError>;

impl From<String> for NdsError {
    fn from(s: String) -> Self {
        NdsError::Other(s)
    }
}

impl From<&str> for NdsError {
    fn from(s: &str) -> Self {
        NdsError::Other(s.to_string())
    }
}

impl From<MultiError> for NdsError {
    fn from(e: MultiError) -> Self {
        NdsError::Multi(e)
    }
}

impl NdsError {
    /// Whether this is the per-key "no such entity" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, NdsError::NotFound)
    }
}

/// Positional errors for a batch operation; `None` marks a slot that succeeded
#[derive(Debug, Default)]
pub struct MultiError(Vec<Option<NdsError>>);

impl MultiError {
    /// Create an all-success vector of `len` slots
    pub fn new(len: usize) -> Self {
        Self((0..len).map(|_| None).collect())
    }

    /// Record an error at `index`
    pub fn set(&mut self, index: usize, err: NdsError) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = Some(err);
        }
    }

    /// Error at `index`, if any
    pub fn get(&self, index: usize) -> Option<&NdsError> {
        self.0.get(index).and_then(Option::as_ref)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failed slots
    pub fn error_count(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether any slot failed
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Option::is_some)
    }

    /// Iterate over slots in order
    pub fn iter(&self) -> impl Iterator<Item = Option<&NdsError>> {
        self.0.iter().map(Option::as_ref)
    }

    /// Consume into the raw slot vector
    pub fn into_inner(self) -> Vec<Option<NdsError>> {
        self.0
    }

    /// `Ok(())` when no slot failed, otherwise the multi-error itself
    pub fn into_result(self) -> Result<()> {
        if self.has_errors() {
            Err(NdsError::Multi(self))
        } else {
            Ok(())
        }
    }
}

impl From<Vec<Option<NdsError>>> for MultiError {
    fn from(slots: Vec<Option<NdsError>>) -> Self {
        Self(slots)
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut failed = self.0.iter().enumerate().filter_map(|(i, e)| e.as_ref().map(|e| (i, e)));
        match (failed.next(), self.error_count()) {
            (None, _) => write!(f, "no errors"),
            (Some((i, e)), 1) => write!(f, "index {}: {}", i, e),
            (Some((i, e)), n) => write!(f, "index {}: {} (and {} other errors)", i, e, n - 1),
        }
    }
}
