//! Deterministic scripted implementation of the shared `agent_provider`
//! contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing: each `run` consumes
//! the next queued turn script and replays it as lifecycle events.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};

use agent_provider::{CancelSignal, ProviderProfile, RunEvent, RunProvider, RunRequest};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Text replayed when the script queue is exhausted.
pub const DEFAULT_TURN_TEXT: &str = "I don't have any further changes to suggest.";

/// One scripted emission inside a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptItem {
    /// Assistant text, streamed as whitespace-delimited deltas.
    Text(String),
    /// A tool call streamed as started, argument fragments, then completed.
    ToolCall {
        call_id: String,
        tool_name: String,
        argument_fragments: Vec<String>,
    },
    /// Token totals reported for the turn.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
    /// Terminates the turn with `Failed` instead of `Finished`.
    Fail { error: String, retryable: bool },
}

/// Ordered emissions for one `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnScript {
    items: Vec<ScriptItem>,
}

impl TurnScript {
    /// Creates an empty turn script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends assistant text to the script.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.items.push(ScriptItem::Text(text.into()));
        self
    }

    /// Appends a full tool-call lifecycle to the script.
    #[must_use]
    pub fn with_tool_call(
        mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        argument_fragments: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.items.push(ScriptItem::ToolCall {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            argument_fragments: argument_fragments
                .into_iter()
                .map(Into::into)
                .collect(),
        });
        self
    }

    /// Appends a usage report to the script.
    #[must_use]
    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.items.push(ScriptItem::Usage {
            input_tokens,
            output_tokens,
        });
        self
    }

    /// Ends the script with a failure; items after this are never replayed.
    #[must_use]
    pub fn with_failure(mut self, error: impl Into<String>, retryable: bool) -> Self {
        self.items.push(ScriptItem::Fail {
            error: error.into(),
            retryable,
        });
        self
    }

    /// Returns the scripted items in replay order.
    #[must_use]
    pub fn items(&self) -> &[ScriptItem] {
        &self.items
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectionState {
    model_index: usize,
}

/// Deterministic scripted provider used by `editing_agent` tests and local runs.
///
/// Runs consume queued scripts in FIFO order; once the queue is empty every
/// subsequent run replays a default text turn.
#[derive(Debug)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<TurnScript>>,
    model_ids: Vec<String>,
    selection: Mutex<SelectionState>,
}

impl ScriptedProvider {
    /// Creates a scripted provider with caller-provided turn scripts and
    /// default model options.
    #[must_use]
    pub fn new(scripts: Vec<TurnScript>) -> Self {
        Self::with_model_ids(
            scripts,
            vec!["mock".to_string(), "mock-alt".to_string()],
        )
    }

    /// Creates a scripted provider with explicit model cycling options.
    #[must_use]
    pub fn with_model_ids(scripts: Vec<TurnScript>, model_ids: Vec<String>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            model_ids: sanitize_model_ids(model_ids),
            selection: Mutex::new(SelectionState { model_index: 0 }),
        }
    }

    /// Appends a script to the end of the replay queue.
    pub fn enqueue(&self, script: TurnScript) {
        lock_unpoisoned(&self.scripts).push_back(script);
    }

    /// Returns how many scripts have not been consumed yet.
    #[must_use]
    pub fn remaining_scripts(&self) -> usize {
        lock_unpoisoned(&self.scripts).len()
    }

    fn next_script(&self) -> TurnScript {
        lock_unpoisoned(&self.scripts)
            .pop_front()
            .unwrap_or_else(default_turn)
    }

    fn profile_for_selection(&self, selection: &SelectionState) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_ids[selection.model_index].clone(),
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RunProvider for ScriptedProvider {
    fn profile(&self) -> ProviderProfile {
        let selection = lock_unpoisoned(&self.selection);
        self.profile_for_selection(&selection)
    }

    fn cycle_model(&self) -> Result<ProviderProfile, String> {
        let mut selection = lock_unpoisoned(&self.selection);
        selection.model_index = (selection.model_index + 1) % self.model_ids.len();
        Ok(self.profile_for_selection(&selection))
    }

    fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;
        let _ = req.messages;
        let _ = req.instructions;
        let _ = req.tools;

        let script = self.next_script();
        emit(RunEvent::Started { run_id });

        for item in script.items {
            if cancel.load(Ordering::SeqCst) {
                emit(RunEvent::Cancelled { run_id });
                return Ok(());
            }

            match item {
                ScriptItem::Text(text) => {
                    for text in word_deltas(&text) {
                        if cancel.load(Ordering::SeqCst) {
                            emit(RunEvent::Cancelled { run_id });
                            return Ok(());
                        }
                        emit(RunEvent::TextDelta { run_id, text });
                    }
                }
                ScriptItem::ToolCall {
                    call_id,
                    tool_name,
                    argument_fragments,
                } => {
                    emit(RunEvent::ToolCallStarted {
                        run_id,
                        call_id: call_id.clone(),
                        tool_name,
                    });
                    for fragment in argument_fragments {
                        if cancel.load(Ordering::SeqCst) {
                            emit(RunEvent::Cancelled { run_id });
                            return Ok(());
                        }
                        emit(RunEvent::ToolCallArgumentsDelta {
                            run_id,
                            call_id: call_id.clone(),
                            fragment,
                        });
                    }
                    emit(RunEvent::ToolCallCompleted { run_id, call_id });
                }
                ScriptItem::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    emit(RunEvent::UsageReported {
                        run_id,
                        input_tokens,
                        output_tokens,
                    });
                }
                ScriptItem::Fail { error, retryable } => {
                    emit(RunEvent::Failed {
                        run_id,
                        error,
                        retryable,
                    });
                    return Ok(());
                }
            }
        }

        if cancel.load(Ordering::SeqCst) {
            emit(RunEvent::Cancelled { run_id });
        } else {
            emit(RunEvent::Finished { run_id });
        }

        Ok(())
    }
}

fn default_turn() -> TurnScript {
    TurnScript::new().with_text(DEFAULT_TURN_TEXT)
}

/// Splits text into streaming deltas, keeping each trailing space or
/// newline attached to the token before it.
fn word_deltas(text: &str) -> Vec<String> {
    let mut deltas = Vec::new();
    let mut pending = String::new();

    for ch in text.chars() {
        pending.push(ch);
        if matches!(ch, ' ' | '\n') {
            deltas.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        deltas.push(pending);
    }

    deltas
}

fn sanitize_model_ids(model_ids: Vec<String>) -> Vec<String> {
    let mut sanitized: Vec<String> = model_ids
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();

    if sanitized.is_empty() {
        sanitized.push("mock".to_string());
    }

    sanitized
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
