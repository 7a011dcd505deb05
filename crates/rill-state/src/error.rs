//! Error types for rill-state operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for rill-state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while addressing or rewriting the state tree.
///
/// Addressing errors are also surfaced as stream errors on the node that
/// raised them (see [`State::diagnostics`](crate::State::diagnostics) and
/// [`KeyedState::diagnostics`](crate::KeyedState::diagnostics)); they stay
/// local to that node and never disturb siblings or ancestors.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum StateError {
    /// Sequence index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at path {path}")]
    IndexOutOfBounds {
        /// The path to the sequence.
        path: Path,
        /// The index that was addressed.
        index: usize,
        /// The actual length of the sequence.
        len: usize,
    },

    /// A trace descended into a value of the wrong shape.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The path where the mismatch occurred.
        path: Path,
        /// The expected shape.
        expected: &'static str,
        /// The actual shape found.
        found: &'static str,
    },

    /// A keyed write addressed an item that is not present in the sequence.
    #[error("no item with key {key} in sequence at {path}")]
    UnknownItemKey {
        /// The path to the sequence.
        path: Path,
        /// Canonical form of the missing key.
        key: String,
    },

    /// A keyed view was attached to a node whose value is not a sequence.
    #[error("keyed view requires a sequence at {path}, found {found}")]
    NotASequence {
        /// The path to the offending node.
        path: Path,
        /// The actual shape found.
        found: &'static str,
    },
}

impl StateError {
    /// Create an index out of bounds error.
    #[inline]
    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        StateError::IndexOutOfBounds { path, index, len }
    }

    /// Create a type mismatch error.
    #[inline]
    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        StateError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    /// Create an unknown item key error.
    #[inline]
    pub fn unknown_item_key(path: Path, key: impl Into<String>) -> Self {
        StateError::UnknownItemKey {
            path,
            key: key.into(),
        }
    }

    /// Create a not-a-sequence error.
    #[inline]
    pub fn not_a_sequence(path: Path, found: &'static str) -> Self {
        StateError::NotASequence { path, found }
    }
}

/// Get the shape name of a JSON value.
#[inline]
pub fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "sequence",
        serde_json::Value::Object(_) => "mapping",
    }
}
