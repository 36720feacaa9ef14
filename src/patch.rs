//! Patch operations and ordered, all-or-nothing patch sets.
//!
//! The wire shape matches what the mutation tool receives from the model:
//!
//! ```json
//! {
//!   "patches": [
//!     { "op": "replace", "path": "/content/0/settings/title", "value": "Hi" }
//!   ],
//!   "summary": "Update the hero title"
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Replace,
    Add,
    Remove,
}

impl PatchOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PatchOp::Replace => "replace",
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
        }
    }

    pub(crate) fn requires_value(self) -> bool {
        matches!(self, PatchOp::Replace | PatchOp::Add)
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation against a pointer path. `value` is required for `replace`
/// and `add`; `remove` ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    #[must_use]
    pub fn replace(path: impl Into<String>, value: Value) -> PatchOperation {
        PatchOperation {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    #[must_use]
    pub fn add(path: impl Into<String>, value: Value) -> PatchOperation {
        PatchOperation {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    #[must_use]
    pub fn remove(path: impl Into<String>) -> PatchOperation {
        PatchOperation {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.path)
    }
}

/// An ordered batch of operations with a human-readable summary.
///
/// A set either fully applies or leaves the document untouched. The empty
/// set is a valid no-op.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatchSet {
    #[serde(rename = "patches")]
    pub operations: Vec<PatchOperation>,
    #[serde(default)]
    pub summary: String,
}

impl PatchSet {
    #[must_use]
    pub fn new(operations: Vec<PatchOperation>, summary: impl Into<String>) -> PatchSet {
        PatchSet {
            operations,
            summary: summary.into(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// One-line description for transcripts and approval prompts: the
    /// summary when present, otherwise the operation list.
    #[must_use]
    pub fn describe(&self) -> String {
        let summary = self.summary.trim();
        if !summary.is_empty() {
            return summary.to_string();
        }
        if self.operations.is_empty() {
            return "no operations".to_string();
        }
        self.operations
            .iter()
            .map(PatchOperation::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
