//! Pre-apply validation of patch sets.
//!
//! Every operation is checked against the same pre-patch document and every
//! failure is reported, so a model can correct a whole set in one round.
//! Interactions between operations inside one set are an apply-time concern
//! (see [`crate::apply`]).

use serde_json::Value;
use thiserror::Error;

use crate::error::PatchError;
use crate::patch::{PatchOp, PatchOperation, PatchSet};
use crate::pointer::{resolve, PointerPath, Resolved, Segment};

/// One invalid operation, positioned by its index in the set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation {index}: {error}")]
pub struct ValidationError {
    pub index: usize,
    pub error: PatchError,
}

/// Validates every operation of `patch` against `document`.
///
/// Returns all failures, not just the first. The empty set validates.
pub fn validate_patch_set(
    document: &Value,
    patch: &PatchSet,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for (index, operation) in patch.operations.iter().enumerate() {
        if let Err(error) = check_operation(document, operation) {
            errors.push(ValidationError { index, error });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_operation(document: &Value, operation: &PatchOperation) -> Result<(), PatchError> {
    if operation.op.requires_value() && operation.value.is_none() {
        return Err(PatchError::MissingValue {
            op: operation.op,
            path: operation.path.clone(),
        });
    }

    let path = PointerPath::parse(&operation.path)?;
    let resolved = resolve(document, &path)?;

    match operation.op {
        PatchOp::Replace | PatchOp::Remove => require_existing(&resolved, &operation.path),
        PatchOp::Add => require_insertable(&resolved, &operation.path),
    }
}

fn require_existing(resolved: &Resolved<'_>, path: &str) -> Result<(), PatchError> {
    if resolved.exists {
        return Ok(());
    }

    match (resolved.parent, &resolved.segment) {
        (Value::Array(items), Segment::Index(index)) => Err(PatchError::IndexOutOfRange {
            path: path.to_string(),
            index: *index,
            len: items.len(),
        }),
        _ => Err(PatchError::PathNotFound {
            path: path.to_string(),
        }),
    }
}

// Appends (index == len) are allowed; objects accept new and existing keys.
fn require_insertable(resolved: &Resolved<'_>, path: &str) -> Result<(), PatchError> {
    match (resolved.parent, &resolved.segment) {
        (Value::Array(items), Segment::Index(index)) if *index > items.len() => {
            Err(PatchError::IndexOutOfRange {
                path: path.to_string(),
                index: *index,
                len: items.len(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::patch::PatchOperation;

    use super::*;

    #[test]
    fn empty_set_is_a_valid_noop() {
        assert!(validate_patch_set(&json!({"a": 1}), &PatchSet::default()).is_ok());
    }

    #[test]
    fn replace_and_add_without_value_are_rejected() {
        let doc = json!({"a": 1});
        let set = PatchSet::new(
            vec![
                PatchOperation {
                    op: PatchOp::Replace,
                    path: "/a".to_string(),
                    value: None,
                },
                PatchOperation {
                    op: PatchOp::Add,
                    path: "/b".to_string(),
                    value: None,
                },
            ],
            "",
        );

        let errors = validate_patch_set(&doc, &set).expect_err("both should fail");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].index, 0);
        assert!(matches!(errors[0].error, PatchError::MissingValue { .. }));
        assert_eq!(errors[1].index, 1);
        assert!(matches!(errors[1].error, PatchError::MissingValue { .. }));
    }

    #[test]
    fn array_add_allows_append_but_not_beyond() {
        let doc = json!({"a": [1, 2]});

        let append = PatchSet::new(vec![PatchOperation::add("/a/2", json!(3))], "");
        assert!(validate_patch_set(&doc, &append).is_ok());

        let beyond = PatchSet::new(vec![PatchOperation::add("/a/3", json!(4))], "");
        let errors = validate_patch_set(&doc, &beyond).expect_err("index 3 exceeds append");
        assert!(matches!(
            errors[0].error,
            PatchError::IndexOutOfRange { index: 3, len: 2, .. }
        ));
    }

    #[test]
    fn remove_requires_index_within_bounds() {
        let doc = json!({"a": [1, 2]});
        let set = PatchSet::new(vec![PatchOperation::remove("/a/2")], "");

        let errors = validate_patch_set(&doc, &set).expect_err("index 2 is past the end");
        assert!(matches!(
            errors[0].error,
            PatchError::IndexOutOfRange { index: 2, len: 2, .. }
        ));
    }

    #[test]
    fn missing_object_key_is_path_not_found() {
        let doc = json!({"a": {"b": 1}});
        let set = PatchSet::new(vec![PatchOperation::remove("/a/c")], "");

        let errors = validate_patch_set(&doc, &set).expect_err("key is absent");
        assert!(matches!(errors[0].error, PatchError::PathNotFound { .. }));
    }

    #[test]
    fn add_through_a_missing_intermediate_is_invalid_path() {
        let doc = json!({"a": {}});
        let set = PatchSet::new(vec![PatchOperation::add("/a/b/c", json!(1))], "");

        let errors = validate_patch_set(&doc, &set).expect_err("intermediate is missing");
        assert!(matches!(errors[0].error, PatchError::InvalidPath { .. }));
    }

    #[test]
    fn validation_reads_the_pre_patch_document_only() {
        // Both removes target /a/1 of the original three-element array, so
        // both validate even though applying them back-to-back shifts
        // indexes. The applier owns that interaction.
        let doc = json!({"a": [1, 2, 3]});
        let set = PatchSet::new(
            vec![
                PatchOperation::remove("/a/1"),
                PatchOperation::remove("/a/1"),
            ],
            "",
        );

        assert!(validate_patch_set(&doc, &set).is_ok());
    }
}
