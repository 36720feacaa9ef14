//! Bounded multi-step turn loop over a single-round-trip provider.
//!
//! One turn is a sequence of model round-trips. Streamed text reaches the
//! session and the host immediately; completed tool calls are executed
//! between round-trips and their results fed back to the model. The loop
//! caps round-trips per turn, never retries a failed stream, and never
//! applies document changes itself.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use agent_provider::{CancelSignal, RunEvent, RunProvider, RunRequest, ToolCallRequest};
use graft::ApprovalGate;
use serde_json::Value;

use crate::events::{push_event, SharedEvents, UiEvent};
use crate::lock_unpoisoned;
use crate::prompt;
use crate::session::{Session, TurnId, UsageTotals};
use crate::tools::{ToolContext, ToolRegistry};

/// Model round-trips allowed per turn before the loop aborts.
pub const DEFAULT_MAX_STEPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AwaitingModel,
    StreamingText,
    StreamingToolCall,
    ToolExecuting,
    Done,
    Aborted,
}

/// Why a turn stopped without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    LoopBoundExceeded,
}

impl AbortReason {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            AbortReason::Cancelled => "cancelled",
            AbortReason::LoopBoundExceeded => "step limit reached",
        }
    }
}

/// Terminal result of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { steps: usize, usage: UsageTotals },
    Aborted { reason: AbortReason },
    Failed { error: String, retryable: bool },
}

/// Everything a worker needs to drive one turn.
pub struct TurnContext {
    pub turn_id: TurnId,
    pub provider: Arc<dyn RunProvider>,
    pub session: Arc<Mutex<Session>>,
    pub gate: Arc<Mutex<ApprovalGate>>,
    pub registry: Arc<Mutex<ToolRegistry>>,
    pub events: SharedEvents,
    pub cancel: CancelSignal,
    pub max_steps: usize,
}

/// Runs one turn to its outcome. Synchronous; the caller owns threading.
pub fn run_turn(ctx: &TurnContext) -> TurnOutcome {
    TurnDriver::new().run(ctx)
}

#[derive(Debug)]
pub struct TurnDriver {
    state: LoopState,
    steps_completed: usize,
    usage: UsageTotals,
}

enum StepOutcome {
    TextOnly,
    ToolCalls(Vec<AssembledToolCall>),
    Cancelled,
    Failed { error: String, retryable: bool },
}

struct AssembledToolCall {
    call_id: String,
    tool_name: String,
    arguments: Value,
}

impl TurnDriver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            steps_completed: 0,
            usage: UsageTotals::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[must_use]
    pub fn steps_completed(&self) -> usize {
        self.steps_completed
    }

    pub fn run(&mut self, ctx: &TurnContext) -> TurnOutcome {
        loop {
            if is_cancelled(&ctx.cancel) {
                self.state = LoopState::Aborted;
                return TurnOutcome::Aborted {
                    reason: AbortReason::Cancelled,
                };
            }

            if self.steps_completed >= ctx.max_steps {
                self.state = LoopState::Aborted;
                return TurnOutcome::Aborted {
                    reason: AbortReason::LoopBoundExceeded,
                };
            }

            match self.run_step(ctx) {
                StepOutcome::TextOnly => {
                    self.state = LoopState::Done;
                    return TurnOutcome::Completed {
                        steps: self.steps_completed,
                        usage: self.usage,
                    };
                }
                StepOutcome::ToolCalls(calls) => {
                    self.state = LoopState::ToolExecuting;
                    self.execute_tool_calls(ctx, calls);
                }
                StepOutcome::Cancelled => {
                    self.state = LoopState::Aborted;
                    return TurnOutcome::Aborted {
                        reason: AbortReason::Cancelled,
                    };
                }
                StepOutcome::Failed { error, retryable } => {
                    self.state = LoopState::Aborted;
                    return TurnOutcome::Failed { error, retryable };
                }
            }
        }
    }

    /// One model round-trip: build the request from current state, stream
    /// events into the session, and classify how the stream ended.
    fn run_step(&mut self, ctx: &TurnContext) -> StepOutcome {
        self.state = LoopState::AwaitingModel;
        self.steps_completed += 1;

        let request = build_run_request(ctx);
        let mut collector = StepCollector::new(ctx);
        let run_result = ctx
            .provider
            .run(request, Arc::clone(&ctx.cancel), &mut |event| {
                collector.handle(event)
            });

        let StepCollector {
            assembled,
            usage,
            terminal,
            streamed_text,
            streamed_tool_call,
            ..
        } = collector;

        self.usage.record(usage.input_tokens, usage.output_tokens);
        if streamed_tool_call {
            self.state = LoopState::StreamingToolCall;
        } else if streamed_text {
            self.state = LoopState::StreamingText;
        }

        if let Err(error) = run_result {
            return StepOutcome::Failed {
                error,
                retryable: false,
            };
        }

        match terminal {
            Some(StepTerminal::Finished) => {
                if assembled.is_empty() {
                    StepOutcome::TextOnly
                } else {
                    StepOutcome::ToolCalls(assembled)
                }
            }
            Some(StepTerminal::Cancelled) => StepOutcome::Cancelled,
            Some(StepTerminal::Failed { error, retryable }) => {
                StepOutcome::Failed { error, retryable }
            }
            None => StepOutcome::Failed {
                error: "provider ended the run without a terminal event".to_string(),
                retryable: false,
            },
        }
    }

    /// Executes assembled calls in stream order. Tool errors are fed back
    /// to the model as error results; only cancellation stops the batch.
    fn execute_tool_calls(&mut self, ctx: &TurnContext, calls: Vec<AssembledToolCall>) {
        for call in calls {
            if is_cancelled(&ctx.cancel) {
                return;
            }

            let request = ToolCallRequest {
                call_id: call.call_id,
                tool_name: call.tool_name,
                arguments: call.arguments,
            };

            let mut staged_events = Vec::new();
            let result = {
                let mut registry = lock_unpoisoned(&ctx.registry);
                let mut gate = lock_unpoisoned(&ctx.gate);
                let document = Arc::clone(gate.document());
                let mut tool_ctx = ToolContext {
                    document,
                    gate: &mut gate,
                    events: &mut staged_events,
                };
                registry.execute(&request, &mut tool_ctx)
            };

            for event in staged_events {
                push_event(&ctx.events, event);
            }
            lock_unpoisoned(&ctx.session).on_tool_result(ctx.turn_id, &result);
        }
    }
}

impl Default for TurnDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn build_run_request(ctx: &TurnContext) -> RunRequest {
    let messages = lock_unpoisoned(&ctx.session).run_messages();
    let document = Arc::clone(lock_unpoisoned(&ctx.gate).document());
    let tools = lock_unpoisoned(&ctx.registry).definitions();

    RunRequest {
        run_id: ctx.turn_id,
        messages,
        instructions: prompt::system_instructions(document.as_ref()),
        tools,
    }
}

enum StepTerminal {
    Finished,
    Cancelled,
    Failed { error: String, retryable: bool },
}

struct PendingToolCall {
    tool_name: String,
    arguments: String,
}

/// Applies one step's provider events to the session and assembles
/// streamed tool-call fragments into complete calls.
struct StepCollector<'a> {
    ctx: &'a TurnContext,
    pending: BTreeMap<String, PendingToolCall>,
    assembled: Vec<AssembledToolCall>,
    usage: UsageTotals,
    terminal: Option<StepTerminal>,
    streamed_text: bool,
    streamed_tool_call: bool,
}

impl<'a> StepCollector<'a> {
    fn new(ctx: &'a TurnContext) -> Self {
        Self {
            ctx,
            pending: BTreeMap::new(),
            assembled: Vec::new(),
            usage: UsageTotals::default(),
            terminal: None,
            streamed_text: false,
            streamed_tool_call: false,
        }
    }

    fn handle(&mut self, event: RunEvent) {
        let turn_id = self.ctx.turn_id;
        match event {
            RunEvent::Started { .. } => {
                lock_unpoisoned(&self.ctx.session).on_turn_started(turn_id);
            }
            RunEvent::TextDelta { text, .. } => {
                self.streamed_text = true;
                lock_unpoisoned(&self.ctx.session).on_text_delta(turn_id, &text);
                push_event(&self.ctx.events, UiEvent::TextDelta { turn_id, text });
            }
            RunEvent::ToolCallStarted {
                call_id, tool_name, ..
            } => {
                self.streamed_tool_call = true;
                self.pending.insert(
                    call_id.clone(),
                    PendingToolCall {
                        tool_name: tool_name.clone(),
                        arguments: String::new(),
                    },
                );
                lock_unpoisoned(&self.ctx.session).on_tool_call_started(
                    turn_id,
                    &call_id,
                    &tool_name,
                );
                push_event(
                    &self.ctx.events,
                    UiEvent::ToolCallStarted {
                        turn_id,
                        call_id,
                        tool_name,
                    },
                );
            }
            RunEvent::ToolCallArgumentsDelta {
                call_id, fragment, ..
            } => {
                if let Some(pending) = self.pending.get_mut(&call_id) {
                    pending.arguments.push_str(&fragment);
                }
            }
            RunEvent::ToolCallCompleted { call_id, .. } => {
                let Some(pending) = self.pending.remove(&call_id) else {
                    return;
                };
                let arguments = parse_tool_arguments(&pending.arguments);
                lock_unpoisoned(&self.ctx.session).on_tool_call_completed(
                    turn_id,
                    &call_id,
                    &pending.tool_name,
                    &arguments,
                );
                self.assembled.push(AssembledToolCall {
                    call_id,
                    tool_name: pending.tool_name,
                    arguments,
                });
            }
            RunEvent::UsageReported {
                input_tokens,
                output_tokens,
                ..
            } => {
                self.usage.record(input_tokens, output_tokens);
                lock_unpoisoned(&self.ctx.session).record_usage(
                    turn_id,
                    input_tokens,
                    output_tokens,
                );
            }
            RunEvent::Finished { .. } => {
                self.terminal = Some(StepTerminal::Finished);
            }
            RunEvent::Failed {
                error, retryable, ..
            } => {
                self.terminal = Some(StepTerminal::Failed { error, retryable });
            }
            RunEvent::Cancelled { .. } => {
                self.terminal = Some(StepTerminal::Cancelled);
            }
        }
    }
}

/// Empty and unparseable argument payloads degrade to `{}`; the handler
/// then reports the missing fields as a usage error.
fn parse_tool_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

fn is_cancelled(cancel: &CancelSignal) -> bool {
    cancel.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_provider_mock::{ScriptedProvider, TurnScript};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;

    fn sample_document() -> Value {
        json!({
            "title": "Landing",
            "content": [
                {
                    "id": "sec1",
                    "elType": "section",
                    "elements": [
                        {
                            "id": "col1",
                            "elType": "column",
                            "elements": [
                                {
                                    "id": "w1",
                                    "elType": "widget",
                                    "widgetType": "heading",
                                    "settings": { "title": "Welcome home" }
                                }
                            ]
                        }
                    ]
                }
            ]
        })
    }

    fn turn_context(provider: Arc<ScriptedProvider>, max_steps: usize) -> TurnContext {
        let session = Arc::new(Mutex::new(Session::new()));
        lock_unpoisoned(&session)
            .begin_turn(1, "make the heading friendlier")
            .expect("turn should begin");

        TurnContext {
            turn_id: 1,
            provider,
            session,
            gate: Arc::new(Mutex::new(ApprovalGate::new(sample_document()))),
            registry: Arc::new(Mutex::new(ToolRegistry::with_builtin_tools())),
            events: Arc::new(Mutex::new(VecDeque::new())),
            cancel: Arc::new(AtomicBool::new(false)),
            max_steps,
        }
    }

    fn patch_arguments() -> String {
        json!({
            "patches": [{
                "op": "replace",
                "path": "/content/0/elements/0/elements/0/settings/title",
                "value": "Welcome aboard"
            }],
            "summary": "Soften the hero heading"
        })
        .to_string()
    }

    #[test]
    fn text_only_turn_completes_in_one_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![TurnScript::new()
            .with_text("The document already looks good.")
            .with_usage(42, 7)]));
        let ctx = turn_context(provider, DEFAULT_MAX_STEPS);

        let mut driver = TurnDriver::new();
        let outcome = driver.run(&ctx);

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                steps: 1,
                usage: UsageTotals {
                    input_tokens: 42,
                    output_tokens: 7,
                },
            }
        );
        assert_eq!(driver.state(), LoopState::Done);

        let session = lock_unpoisoned(&ctx.session);
        let messages = session.run_messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[1],
            agent_provider::RunMessage::AssistantText { text }
                if text == "The document already looks good."
        ));
    }

    #[test]
    fn tool_call_round_trip_feeds_result_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            TurnScript::new().with_text("Checking the layout.").with_tool_call(
                "call-1",
                "analyze_json_structure",
                [r#"{"query_type":"#, r#""list_widgets"}"#],
            ),
            TurnScript::new().with_text("One heading widget found."),
        ]));
        let ctx = turn_context(Arc::clone(&provider), DEFAULT_MAX_STEPS);

        let outcome = run_turn(&ctx);

        assert!(matches!(outcome, TurnOutcome::Completed { steps: 2, .. }));
        assert_eq!(provider.remaining_scripts(), 0);

        let session = lock_unpoisoned(&ctx.session);
        let messages = session.run_messages();
        assert!(matches!(
            &messages[2],
            agent_provider::RunMessage::ToolCall { tool_name, .. }
                if tool_name == "analyze_json_structure"
        ));
        let agent_provider::RunMessage::ToolResult {
            is_error, content, ..
        } = &messages[3]
        else {
            panic!("expected a tool result, got {:?}", messages[3]);
        };
        assert!(!*is_error);
        assert_eq!(content["count"], json!(3));

        let events = lock_unpoisoned(&ctx.events);
        assert!(events.iter().any(|event| matches!(
            event,
            UiEvent::ToolCallStarted { call_id, .. } if call_id == "call-1"
        )));
    }

    #[test]
    fn patch_tool_creates_pending_approval_without_applying() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            TurnScript::new().with_tool_call("call-1", "generate_json_patch", [patch_arguments()]),
            TurnScript::new().with_text("Waiting for your approval."),
        ]));
        let ctx = turn_context(provider, DEFAULT_MAX_STEPS);

        let outcome = run_turn(&ctx);

        assert!(matches!(outcome, TurnOutcome::Completed { steps: 2, .. }));

        let gate = lock_unpoisoned(&ctx.gate);
        assert_eq!(gate.pending().len(), 1);
        assert_eq!(
            gate.document()["content"][0]["elements"][0]["elements"][0]["settings"]["title"],
            json!("Welcome home")
        );
        drop(gate);

        let events = lock_unpoisoned(&ctx.events);
        assert!(events.iter().any(|event| matches!(
            event,
            UiEvent::PendingApprovalCreated { summary, .. }
                if summary == "Soften the hero heading"
        )));
    }

    #[test]
    fn loop_bound_aborts_after_max_steps() {
        let scripts: Vec<TurnScript> = (0..6)
            .map(|index| {
                TurnScript::new().with_tool_call(
                    format!("call-{index}"),
                    "analyze_json_structure",
                    [r#"{"query_type":"list_widgets"}"#],
                )
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let ctx = turn_context(Arc::clone(&provider), DEFAULT_MAX_STEPS);

        let mut driver = TurnDriver::new();
        let outcome = driver.run(&ctx);

        assert_eq!(
            outcome,
            TurnOutcome::Aborted {
                reason: AbortReason::LoopBoundExceeded,
            }
        );
        assert_eq!(driver.steps_completed(), DEFAULT_MAX_STEPS);
        assert_eq!(driver.state(), LoopState::Aborted);
        assert_eq!(provider.remaining_scripts(), 1);
    }

    #[test]
    fn provider_failure_stops_the_loop_without_retry() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            TurnScript::new()
                .with_text("partial answer")
                .with_failure("stream reset", true),
            TurnScript::new().with_text("never reached"),
        ]));
        let ctx = turn_context(Arc::clone(&provider), DEFAULT_MAX_STEPS);

        let outcome = run_turn(&ctx);

        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                error: "stream reset".to_string(),
                retryable: true,
            }
        );
        assert_eq!(provider.remaining_scripts(), 1);
    }

    #[test]
    fn cancelled_before_first_step_issues_no_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            TurnScript::new().with_text("never streamed")
        ]));
        let ctx = turn_context(Arc::clone(&provider), DEFAULT_MAX_STEPS);
        ctx.cancel.store(true, Ordering::SeqCst);

        let outcome = run_turn(&ctx);

        assert_eq!(
            outcome,
            TurnOutcome::Aborted {
                reason: AbortReason::Cancelled,
            }
        );
        assert_eq!(provider.remaining_scripts(), 1);
    }

    #[test]
    fn malformed_tool_arguments_become_a_usage_error_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            TurnScript::new().with_tool_call("call-1", "generate_json_patch", ["not json"]),
            TurnScript::new().with_text("Let me try again."),
        ]));
        let ctx = turn_context(provider, DEFAULT_MAX_STEPS);

        let outcome = run_turn(&ctx);

        assert!(matches!(outcome, TurnOutcome::Completed { steps: 2, .. }));

        let session = lock_unpoisoned(&ctx.session);
        let messages = session.run_messages();
        let agent_provider::RunMessage::ToolResult {
            is_error, content, ..
        } = &messages[2]
        else {
            panic!("expected a tool result, got {:?}", messages[2]);
        };
        assert!(*is_error);
        assert!(content["error"]
            .as_str()
            .is_some_and(|text| text.contains("patches")));
    }

    #[test]
    fn parse_tool_arguments_degrades_to_empty_object() {
        assert_eq!(parse_tool_arguments(""), json!({}));
        assert_eq!(parse_tool_arguments("   "), json!({}));
        assert_eq!(parse_tool_arguments("{broken"), json!({}));
        assert_eq!(
            parse_tool_arguments(r#"{"query_type":"list_widgets"}"#),
            json!({"query_type": "list_widgets"})
        );
    }
}
