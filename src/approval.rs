//! Approval-gated mutation of the live document.
//!
//! Model-proposed patch sets queue here; only an explicit `approve` commits
//! their effect to history. The gate is the sole mutation path for the
//! document it guards. Undoing, redoing, and reading the present all go
//! through the gate so there is exactly one place where the live snapshot
//! changes hands.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::apply::{apply_patch_set, ApplyFailure};
use crate::history::{DocumentHistory, Snapshot};
use crate::patch::PatchSet;
use crate::validate::{validate_patch_set, ValidationError};

/// Opaque identifier handed out at proposal time.
pub type ApprovalId = Uuid;

/// A patch set waiting for a human decision.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub id: ApprovalId,
    pub patch: PatchSet,
    /// The present at proposal time. Shared with history, never cloned, so
    /// hosts can detect drift by identity.
    pub snapshot_before: Snapshot,
}

/// What an approval changed.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub id: ApprovalId,
    pub summary: String,
    pub document: Snapshot,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApprovalError {
    #[error("no pending approval with id `{id}`")]
    UnknownApproval { id: ApprovalId },

    /// The document drifted since the proposal and the patch no longer
    /// validates. The proposal is consumed: the document only moves further
    /// away, so a stale set cannot become valid again.
    #[error("patch no longer applies to the current document")]
    Conflict {
        id: ApprovalId,
        errors: Vec<ValidationError>,
    },

    #[error("patch failed to apply: {failure}")]
    Apply { id: ApprovalId, failure: ApplyFailure },
}

/// Queue of pending proposals in front of a [`DocumentHistory`].
#[derive(Debug)]
pub struct ApprovalGate {
    history: DocumentHistory,
    pending: Vec<PendingApproval>,
}

impl ApprovalGate {
    #[must_use]
    pub fn new(initial: Value) -> ApprovalGate {
        ApprovalGate {
            history: DocumentHistory::new(initial),
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_capacity(initial: Value, capacity: usize) -> ApprovalGate {
        ApprovalGate {
            history: DocumentHistory::with_capacity(initial, capacity),
            pending: Vec::new(),
        }
    }

    /// Validates `patch` against the current present and queues it.
    /// Proposals queue in order; several can be pending at once.
    pub fn propose(&mut self, patch: PatchSet) -> Result<ApprovalId, Vec<ValidationError>> {
        validate_patch_set(self.history.present().as_ref(), &patch)?;

        let id = Uuid::new_v4();
        self.pending.push(PendingApproval {
            id,
            patch,
            snapshot_before: Arc::clone(self.history.present()),
        });
        Ok(id)
    }

    /// Applies and commits a pending proposal.
    ///
    /// The patch is re-validated against the current present, not the
    /// snapshot it was proposed against: approving an older proposal after
    /// the document moved must surface a conflict instead of silently
    /// patching the wrong tree. On conflict or apply failure the document
    /// and history are untouched.
    pub fn approve(&mut self, id: ApprovalId) -> Result<ApprovalOutcome, ApprovalError> {
        let pending = self.take_pending(id)?;

        if let Err(errors) = validate_patch_set(self.history.present().as_ref(), &pending.patch)
        {
            return Err(ApprovalError::Conflict { id, errors });
        }

        let next = apply_patch_set(self.history.present().as_ref(), &pending.patch)
            .map_err(|failure| ApprovalError::Apply { id, failure })?;
        self.history.commit(Arc::new(next));

        Ok(ApprovalOutcome {
            id,
            summary: pending.patch.describe(),
            document: Arc::clone(self.history.present()),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        })
    }

    /// Discards a pending proposal. No document or history effect.
    pub fn decline(&mut self, id: ApprovalId) -> Result<PendingApproval, ApprovalError> {
        self.take_pending(id)
    }

    pub fn undo(&mut self) -> Option<Snapshot> {
        self.history.undo()
    }

    pub fn redo(&mut self) -> Option<Snapshot> {
        self.history.redo()
    }

    #[must_use]
    pub fn document(&self) -> &Snapshot {
        self.history.present()
    }

    #[must_use]
    pub fn pending(&self) -> &[PendingApproval] {
        &self.pending
    }

    #[must_use]
    pub fn history(&self) -> &DocumentHistory {
        &self.history
    }

    fn take_pending(&mut self, id: ApprovalId) -> Result<PendingApproval, ApprovalError> {
        let position = self
            .pending
            .iter()
            .position(|pending| pending.id == id)
            .ok_or(ApprovalError::UnknownApproval { id })?;
        Ok(self.pending.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::patch::PatchOperation;

    use super::*;

    #[test]
    fn propose_rejects_invalid_sets_without_queueing() {
        let mut gate = ApprovalGate::new(json!({"a": [1]}));
        let errors = gate
            .propose(PatchSet::new(vec![PatchOperation::remove("/a/9")], ""))
            .expect_err("out-of-range remove should not queue");

        assert_eq!(errors.len(), 1);
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn approve_applies_and_commits() {
        let mut gate = ApprovalGate::new(json!({"a": [1, 2, 3]}));
        let id = gate
            .propose(PatchSet::new(
                vec![PatchOperation::remove("/a/1")],
                "Drop the middle entry",
            ))
            .expect("valid proposal queues");

        let outcome = gate.approve(id).expect("approval applies");
        assert_eq!(outcome.document.as_ref(), &json!({"a": [1, 3]}));
        assert_eq!(outcome.summary, "Drop the middle entry");
        assert!(outcome.can_undo);
        assert!(!outcome.can_redo);
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn decline_leaves_the_present_reference_identical() {
        let mut gate = ApprovalGate::new(json!({"a": 1}));
        let before = Arc::clone(gate.document());

        let id = gate
            .propose(PatchSet::new(
                vec![PatchOperation::replace("/a", json!(2))],
                "",
            ))
            .expect("valid proposal queues");
        gate.decline(id).expect("pending entry declines");

        assert!(Arc::ptr_eq(gate.document(), &before));
        assert!(!gate.history().can_undo());
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut gate = ApprovalGate::new(json!({}));
        let id = Uuid::new_v4();
        assert_eq!(
            gate.approve(id).expect_err("nothing pending"),
            ApprovalError::UnknownApproval { id }
        );
    }

    #[test]
    fn approve_revalidates_against_the_drifted_present() {
        let mut gate = ApprovalGate::new(json!({"a": [1, 2]}));
        let stale = gate
            .propose(PatchSet::new(vec![PatchOperation::remove("/a/1")], ""))
            .expect("valid at proposal time");

        // Another approved proposal shrinks the array first.
        let shrink = gate
            .propose(PatchSet::new(vec![PatchOperation::remove("/a/0")], ""))
            .expect("valid proposal queues");
        gate.approve(shrink).expect("shrink applies");

        let err = gate.approve(stale).expect_err("stale set conflicts");
        assert!(matches!(err, ApprovalError::Conflict { .. }));
        assert_eq!(gate.document().as_ref(), &json!({"a": [2]}));
        assert!(gate.pending().is_empty());
    }

    #[test]
    fn queued_proposals_survive_an_unrelated_approval() {
        let mut gate = ApprovalGate::new(json!({"a": 1, "b": 2}));
        let first = gate
            .propose(PatchSet::new(
                vec![PatchOperation::replace("/a", json!(10))],
                "",
            ))
            .expect("first queues");
        let second = gate
            .propose(PatchSet::new(
                vec![PatchOperation::replace("/b", json!(20))],
                "",
            ))
            .expect("second queues");

        gate.approve(first).expect("first applies");
        assert_eq!(gate.pending().len(), 1);
        assert_eq!(gate.pending()[0].id, second);

        gate.approve(second).expect("second still applies");
        assert_eq!(gate.document().as_ref(), &json!({"a": 10, "b": 20}));
    }
}
