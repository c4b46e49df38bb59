//! Error taxonomy shared by every module in the crate.
//!
//! Negative lookup results are not errors: `locate` and `string_to_id`
//! return `Option` and reserve this enum for genuine failures.

use std::fmt;

/// Errors raised while encoding, resolving, merging, or reading dictionaries.
#[derive(Debug)]
pub enum DictError {
    /// Underlying I/O error.
    Io(std::io::Error),
    /// Structural problem with inputs or unsupported feature.
    Invalid(&'static str),
    /// Caller precondition broken: input strings must be strictly
    /// increasing and deduplicated. `position` is the offending index.
    OrderingViolation { position: usize },
    /// Identifier outside `[1, max]` for its role or section.
    OutOfRangeId { id: u64, max: u64 },
    /// Persisted structure is internally inconsistent.
    Malformed(String),
}

impl fmt::Display for DictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictError::Io(e) => write!(f, "{}", e),
            DictError::Invalid(m) => write!(f, "{}", m),
            DictError::OrderingViolation { position } => {
                write!(f, "input not strictly increasing at index {}", position)
            }
            DictError::OutOfRangeId { id, max } => {
                write!(f, "id {} outside valid range [1, {}]", id, max)
            }
            DictError::Malformed(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for DictError {}

impl From<std::io::Error> for DictError {
    fn from(e: std::io::Error) -> Self {
        DictError::Io(e)
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, DictError>;
