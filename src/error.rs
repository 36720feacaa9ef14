//! Structured errors for pointer resolution, validation, and application.

use thiserror::Error;

use crate::patch::PatchOp;

/// A single failed check for one patch operation against a document.
///
/// Variants carry the offending pointer path as written in the operation so
/// callers can surface it without re-deriving context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Malformed pointer syntax, or an intermediate segment that lands on a
    /// scalar or a missing container.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A `replace` or `remove` target that does not exist.
    #[error("path `{path}` does not exist")]
    PathNotFound { path: String },

    /// A `replace` or `add` operation that carried no value.
    #[error("`{op}` at `{path}` requires a value")]
    MissingValue { op: PatchOp, path: String },

    /// An array index outside the range the operation permits.
    #[error("index {index} is out of range for array of length {len} at `{path}`")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

impl PatchError {
    /// The pointer path the failing operation addressed.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            PatchError::InvalidPath { path, .. }
            | PatchError::PathNotFound { path }
            | PatchError::MissingValue { path, .. }
            | PatchError::IndexOutOfRange { path, .. } => path,
        }
    }
}
