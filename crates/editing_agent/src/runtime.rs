//! Thread-based runtime tying the session, approval gate, tool registry,
//! and provider together behind a host-facing API.
//!
//! Each submitted turn runs on its own named worker thread; every other
//! operation executes on the caller's thread and returns immediately.
//! Hosts poll [`EditorRuntime::drain_events`] for UI updates.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use agent_provider::{CancelSignal, ProviderProfile, RunProvider, ToolDefinition};
use graft::{ApprovalError, ApprovalGate, ApprovalId, ApprovalOutcome, PendingApproval, Snapshot};
use serde_json::Value;

use crate::events::{new_shared_events, push_event, DocumentChangeSource, SharedEvents, UiEvent};
use crate::lock_unpoisoned;
use crate::orchestrator::{self, AbortReason, TurnContext, TurnOutcome, DEFAULT_MAX_STEPS};
use crate::session::{Mode, Session, TurnId, UsageTotals, ERROR_TURN_ALREADY_ACTIVE};
use crate::tools::{ToolHandler, ToolRegistry};

struct ActiveTurn {
    turn_id: TurnId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

pub struct EditorRuntime {
    session: Arc<Mutex<Session>>,
    gate: Arc<Mutex<ApprovalGate>>,
    registry: Arc<Mutex<ToolRegistry>>,
    provider: Arc<dyn RunProvider>,
    events: SharedEvents,
    next_turn_id: AtomicU64,
    active_turn: Mutex<Option<ActiveTurn>>,
    max_steps: usize,
}

impl EditorRuntime {
    /// Runtime over `initial_document` with the built-in document tools.
    pub fn new(initial_document: Value, provider: Arc<dyn RunProvider>) -> Arc<Self> {
        Self::with_options(
            initial_document,
            provider,
            ToolRegistry::with_builtin_tools(),
            DEFAULT_MAX_STEPS,
        )
    }

    pub fn with_options(
        initial_document: Value,
        provider: Arc<dyn RunProvider>,
        registry: ToolRegistry,
        max_steps: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(Mutex::new(Session::new())),
            gate: Arc::new(Mutex::new(ApprovalGate::new(initial_document))),
            registry: Arc::new(Mutex::new(registry)),
            provider,
            events: new_shared_events(),
            next_turn_id: AtomicU64::new(1),
            active_turn: Mutex::new(None),
            max_steps,
        })
    }

    /// Starts a turn for `text`. Refused while another turn is in flight.
    pub fn submit(self: &Arc<Self>, text: impl Into<String>) -> Result<TurnId, String> {
        let prompt = text.into().trim().to_string();
        if prompt.is_empty() {
            return Err("Cannot submit an empty message".to_string());
        }

        let mut active_turn = lock_unpoisoned(&self.active_turn);
        reap_finished_turn(&mut active_turn);
        if active_turn.is_some() {
            return Err(ERROR_TURN_ALREADY_ACTIVE.to_string());
        }

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.session).begin_turn(turn_id, &prompt)?;
        push_event(&self.events, UiEvent::TurnStarted { turn_id });

        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        match self.spawn_turn_worker(turn_id, Arc::clone(&cancel)) {
            Ok(join_handle) => {
                *active_turn = Some(ActiveTurn {
                    turn_id,
                    cancel,
                    join_handle: Some(join_handle),
                });
                Ok(turn_id)
            }
            Err(error) => {
                lock_unpoisoned(&self.session).on_turn_failed(turn_id, &error);
                push_event(
                    &self.events,
                    UiEvent::TurnFailed {
                        turn_id,
                        error: error.clone(),
                        retryable: false,
                    },
                );
                Err(error)
            }
        }
    }

    /// Requests cancellation of the active turn. Visible session state
    /// settles immediately; the worker exits at its next cancel check.
    pub fn cancel(&self) {
        let Some(turn_id) = lock_unpoisoned(&self.session).begin_cancel() else {
            return;
        };

        let active_turn = lock_unpoisoned(&self.active_turn);
        if let Some(active) = active_turn.as_ref() {
            if active.turn_id == turn_id {
                active.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Applies a queued patch after re-validation against the current
    /// document.
    pub fn approve(&self, id: ApprovalId) -> Result<ApprovalOutcome, ApprovalError> {
        let outcome = lock_unpoisoned(&self.gate).approve(id)?;

        lock_unpoisoned(&self.session)
            .push_system_message(format!("Applied patch: {}", outcome.summary));
        push_event(
            &self.events,
            UiEvent::DocumentChanged {
                document: Arc::clone(&outcome.document),
                source: DocumentChangeSource::Approval,
            },
        );
        push_event(
            &self.events,
            UiEvent::HistoryChanged {
                can_undo: outcome.can_undo,
                can_redo: outcome.can_redo,
            },
        );
        Ok(outcome)
    }

    /// Discards a queued patch without touching the document.
    pub fn decline(&self, id: ApprovalId) -> Result<(), ApprovalError> {
        let declined = lock_unpoisoned(&self.gate).decline(id)?;
        lock_unpoisoned(&self.session)
            .push_system_message(format!("Declined patch: {}", declined.patch.describe()));
        Ok(())
    }

    pub fn undo(&self) -> Option<Snapshot> {
        let (document, can_undo, can_redo) = {
            let mut gate = lock_unpoisoned(&self.gate);
            let document = gate.undo()?;
            (document, gate.history().can_undo(), gate.history().can_redo())
        };

        push_event(
            &self.events,
            UiEvent::DocumentChanged {
                document: Arc::clone(&document),
                source: DocumentChangeSource::Undo,
            },
        );
        push_event(&self.events, UiEvent::HistoryChanged { can_undo, can_redo });
        Some(document)
    }

    pub fn redo(&self) -> Option<Snapshot> {
        let (document, can_undo, can_redo) = {
            let mut gate = lock_unpoisoned(&self.gate);
            let document = gate.redo()?;
            (document, gate.history().can_undo(), gate.history().can_redo())
        };

        push_event(
            &self.events,
            UiEvent::DocumentChanged {
                document: Arc::clone(&document),
                source: DocumentChangeSource::Redo,
            },
        );
        push_event(&self.events, UiEvent::HistoryChanged { can_undo, can_redo });
        Some(document)
    }

    #[must_use]
    pub fn document(&self) -> Snapshot {
        Arc::clone(lock_unpoisoned(&self.gate).document())
    }

    #[must_use]
    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        lock_unpoisoned(&self.gate).pending().to_vec()
    }

    /// Drains queued UI events in arrival order.
    pub fn drain_events(&self) -> Vec<UiEvent> {
        lock_unpoisoned(&self.events).drain(..).collect()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        lock_unpoisoned(&self.session).mode
    }

    #[must_use]
    pub fn usage(&self) -> UsageTotals {
        lock_unpoisoned(&self.session).usage()
    }

    /// Shared session handle for hosts rendering the transcript.
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }

    /// Registers an embedder tool alongside the built-ins.
    pub fn register_tool(&self, definition: ToolDefinition, handler: Box<dyn ToolHandler>) {
        lock_unpoisoned(&self.registry).register(definition, handler);
    }

    #[must_use]
    pub fn profile(&self) -> ProviderProfile {
        self.provider.profile()
    }

    pub fn cycle_model(&self) -> Result<ProviderProfile, String> {
        self.provider.cycle_model()
    }

    fn spawn_turn_worker(
        self: &Arc<Self>,
        turn_id: TurnId,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let runtime = Arc::clone(self);
        thread::Builder::new()
            .name(format!("editing-agent-turn-{turn_id}"))
            .spawn(move || runtime.turn_worker(turn_id, cancel))
            .map_err(|error| format!("Failed to spawn turn worker: {error}"))
    }

    fn turn_worker(self: Arc<Self>, turn_id: TurnId, cancel: CancelSignal) {
        let ctx = TurnContext {
            turn_id,
            provider: Arc::clone(&self.provider),
            session: Arc::clone(&self.session),
            gate: Arc::clone(&self.gate),
            registry: Arc::clone(&self.registry),
            events: Arc::clone(&self.events),
            cancel,
            max_steps: self.max_steps,
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| orchestrator::run_turn(&ctx))) {
            Ok(outcome) => outcome,
            Err(_) => TurnOutcome::Failed {
                error: "Turn worker panicked".to_string(),
                retryable: false,
            },
        };

        self.settle_turn(turn_id, outcome);
        self.clear_active_turn_if_matching(turn_id);
    }

    fn settle_turn(&self, turn_id: TurnId, outcome: TurnOutcome) {
        match outcome {
            TurnOutcome::Completed { steps, usage } => {
                lock_unpoisoned(&self.session).on_turn_finished(turn_id);
                push_event(
                    &self.events,
                    UiEvent::TurnCompleted {
                        turn_id,
                        steps,
                        usage,
                    },
                );
            }
            TurnOutcome::Aborted {
                reason: AbortReason::Cancelled,
            } => {
                lock_unpoisoned(&self.session).on_turn_cancelled(turn_id);
                push_event(
                    &self.events,
                    UiEvent::LoopAborted {
                        turn_id,
                        reason: AbortReason::Cancelled,
                    },
                );
            }
            TurnOutcome::Aborted { reason } => {
                lock_unpoisoned(&self.session).on_turn_aborted(turn_id, reason.describe());
                push_event(&self.events, UiEvent::LoopAborted { turn_id, reason });
            }
            TurnOutcome::Failed { error, retryable } => {
                lock_unpoisoned(&self.session).on_turn_failed(turn_id, &error);
                push_event(
                    &self.events,
                    UiEvent::TurnFailed {
                        turn_id,
                        error,
                        retryable,
                    },
                );
            }
        }
    }

    fn clear_active_turn_if_matching(&self, turn_id: TurnId) {
        let mut active_turn = lock_unpoisoned(&self.active_turn);
        let matches = active_turn
            .as_ref()
            .is_some_and(|active| active.turn_id == turn_id);
        if matches {
            // The worker clears its own slot; joining here would deadlock.
            active_turn.take();
        }
    }
}

/// Joins and clears a turn whose worker has already exited.
fn reap_finished_turn(active_turn: &mut Option<ActiveTurn>) {
    let finished = active_turn.as_ref().is_some_and(|active| {
        active
            .join_handle
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    });
    if !finished {
        return;
    }

    if let Some(mut completed) = active_turn.take() {
        if let Some(join_handle) = completed.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}
