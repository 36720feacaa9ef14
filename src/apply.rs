//! Clone-and-mutate application of patch sets.

use serde_json::Value;
use thiserror::Error;

use crate::error::PatchError;
use crate::patch::{PatchOp, PatchOperation, PatchSet};
use crate::pointer::{escape, walk_mut, PointerPath, Segment};

/// An operation that failed mid-application, positioned by its index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation {index} failed to apply: {error}")]
pub struct ApplyFailure {
    pub index: usize,
    pub error: PatchError,
}

/// Applies `patch` to a single deep clone of `document`, in order.
///
/// On any failure the clone is discarded and the caller's document is
/// untouched, so a set is all-or-nothing from the caller's point of view.
///
/// Operations after the first see the partially patched clone: array
/// indexes are interpreted against the array as it stands when the
/// operation runs. A set that removes `/a/1` twice removes two different
/// elements of the original array. Sets produced by the model are written
/// against this reading, so it is part of the contract rather than a bug
/// to compensate for.
pub fn apply_patch_set(document: &Value, patch: &PatchSet) -> Result<Value, ApplyFailure> {
    let mut working = document.clone();
    for (index, operation) in patch.operations.iter().enumerate() {
        apply_operation(&mut working, operation)
            .map_err(|error| ApplyFailure { index, error })?;
    }
    Ok(working)
}

fn apply_operation(document: &mut Value, operation: &PatchOperation) -> Result<(), PatchError> {
    let path = PointerPath::parse(&operation.path)?;
    let Some((last, intermediate)) = path.segments().split_last() else {
        return Err(PatchError::InvalidPath {
            path: operation.path.clone(),
            reason: "the root is not addressable through a parent".to_string(),
        });
    };

    let parent =
        walk_mut(document, intermediate).map_err(|reason| PatchError::InvalidPath {
            path: operation.path.clone(),
            reason,
        })?;

    match operation.op {
        PatchOp::Replace => replace_in(parent, last, required_value(operation)?, &operation.path),
        PatchOp::Add => add_in(parent, last, required_value(operation)?, &operation.path),
        PatchOp::Remove => remove_in(parent, last, &operation.path),
    }
}

fn required_value(operation: &PatchOperation) -> Result<Value, PatchError> {
    operation.value.clone().ok_or_else(|| PatchError::MissingValue {
        op: operation.op,
        path: operation.path.clone(),
    })
}

fn replace_in(
    parent: &mut Value,
    segment: &Segment,
    value: Value,
    path: &str,
) -> Result<(), PatchError> {
    match (parent, segment) {
        (Value::Object(map), Segment::Key(key)) => match map.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(not_found(path)),
        },
        (Value::Object(map), Segment::Index(index)) => match map.get_mut(&index.to_string()) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(not_found(path)),
        },
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            match items.get_mut(*index) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(out_of_range(path, *index, len)),
            }
        }
        (Value::Array(_), Segment::Key(key)) => Err(array_key(path, key)),
        _ => Err(scalar_parent(path)),
    }
}

fn add_in(
    parent: &mut Value,
    segment: &Segment,
    value: Value,
    path: &str,
) -> Result<(), PatchError> {
    match (parent, segment) {
        (Value::Object(map), Segment::Key(key)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Value::Object(map), Segment::Index(index)) => {
            map.insert(index.to_string(), value);
            Ok(())
        }
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            if *index > len {
                return Err(out_of_range(path, *index, len));
            }
            // index == len appends, anything lower shifts the tail right
            items.insert(*index, value);
            Ok(())
        }
        (Value::Array(_), Segment::Key(key)) => Err(array_key(path, key)),
        _ => Err(scalar_parent(path)),
    }
}

fn remove_in(parent: &mut Value, segment: &Segment, path: &str) -> Result<(), PatchError> {
    match (parent, segment) {
        (Value::Object(map), Segment::Key(key)) => {
            if map.remove(key).is_some() {
                Ok(())
            } else {
                Err(not_found(path))
            }
        }
        (Value::Object(map), Segment::Index(index)) => {
            if map.remove(&index.to_string()).is_some() {
                Ok(())
            } else {
                Err(not_found(path))
            }
        }
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            if *index < len {
                items.remove(*index);
                Ok(())
            } else {
                Err(out_of_range(path, *index, len))
            }
        }
        (Value::Array(_), Segment::Key(key)) => Err(array_key(path, key)),
        _ => Err(scalar_parent(path)),
    }
}

fn not_found(path: &str) -> PatchError {
    PatchError::PathNotFound {
        path: path.to_string(),
    }
}

fn out_of_range(path: &str, index: usize, len: usize) -> PatchError {
    PatchError::IndexOutOfRange {
        path: path.to_string(),
        index,
        len,
    }
}

fn array_key(path: &str, key: &str) -> PatchError {
    PatchError::InvalidPath {
        path: path.to_string(),
        reason: format!("array segment `{}` must be a non-negative integer", escape(key)),
    }
}

fn scalar_parent(path: &str) -> PatchError {
    PatchError::InvalidPath {
        path: path.to_string(),
        reason: "cannot address into a scalar".to_string(),
    }
}
