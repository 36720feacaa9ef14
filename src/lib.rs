//! Approval-gated JSON patch engine with bounded undo/redo history.
//!
//! Invariant: single mutation gate. Only [`ApprovalGate::approve`] (and the
//! gate's undo/redo) changes which snapshot is the live document.
//!
//! # Public API Overview
//! - Parse and resolve pointer paths over `serde_json` trees
//!   ([`PointerPath`], [`resolve`]).
//! - Model ordered, all-or-nothing patch sets ([`PatchSet`]).
//! - Validate against the pre-patch document ([`validate_patch_set`]) and
//!   apply on a single clone ([`apply_patch_set`]).
//! - Keep a bounded past/present/future snapshot history
//!   ([`DocumentHistory`]).
//! - Queue model-proposed sets behind an explicit human decision
//!   ([`ApprovalGate`]).
//! - Answer read-only structure queries for the analysis tool
//!   ([`inspect`]).
//!
//! The crate is pure state: no I/O, no threads, no event emission. The
//! orchestration layer (`editing_agent`) wires it to a model provider.

pub mod apply;
pub mod approval;
pub mod error;
pub mod history;
pub mod inspect;
pub mod patch;
pub mod pointer;
pub mod validate;

/// Patch application on a single clone.
pub use crate::apply::{apply_patch_set, ApplyFailure};

/// Proposal queue and the sole mutation path.
pub use crate::approval::{
    ApprovalError, ApprovalGate, ApprovalId, ApprovalOutcome, PendingApproval,
};

/// Error taxonomy shared by resolution, validation, and application.
pub use crate::error::PatchError;

/// Snapshot stacks with capacity eviction.
pub use crate::history::{DocumentHistory, Snapshot, DEFAULT_CAPACITY};

/// Read-only structure queries.
pub use crate::inspect::{
    find_property, list_widgets, search_value, summarize_widgets, widget_info, ElementDetail,
    ElementSummary, PropertyHit,
};

/// Patch operations and ordered sets.
pub use crate::patch::{PatchOp, PatchOperation, PatchSet};

/// Pointer paths and resolution.
pub use crate::pointer::{resolve, PointerPath, Resolved, Segment};

/// Pre-apply validation.
pub use crate::validate::{validate_patch_set, ValidationError};
