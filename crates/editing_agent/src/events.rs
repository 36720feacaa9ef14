//! Host-facing runtime events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use graft::{ApprovalId, Snapshot};

use crate::lock_unpoisoned;
use crate::orchestrator::AbortReason;
use crate::session::{TurnId, UsageTotals};

/// What changed the document snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentChangeSource {
    Approval,
    Undo,
    Redo,
}

/// Events drained by the host in arrival order to drive its UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    TurnStarted {
        turn_id: TurnId,
    },
    TextDelta {
        turn_id: TurnId,
        text: String,
    },
    ToolCallStarted {
        turn_id: TurnId,
        call_id: String,
        tool_name: String,
    },
    PendingApprovalCreated {
        approval_id: ApprovalId,
        summary: String,
    },
    DocumentChanged {
        document: Snapshot,
        source: DocumentChangeSource,
    },
    HistoryChanged {
        can_undo: bool,
        can_redo: bool,
    },
    TurnCompleted {
        turn_id: TurnId,
        steps: usize,
        usage: UsageTotals,
    },
    LoopAborted {
        turn_id: TurnId,
        reason: AbortReason,
    },
    TurnFailed {
        turn_id: TurnId,
        error: String,
        retryable: bool,
    },
}

/// Queue the runtime pushes to and the host drains.
pub type SharedEvents = Arc<Mutex<VecDeque<UiEvent>>>;

pub(crate) fn new_shared_events() -> SharedEvents {
    Arc::new(Mutex::new(VecDeque::new()))
}

pub(crate) fn push_event(events: &SharedEvents, event: UiEvent) {
    lock_unpoisoned(events).push_back(event);
}
