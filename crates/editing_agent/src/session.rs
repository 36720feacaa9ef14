//! Session state shared between the runtime and its host.
//!
//! `Session` owns the visible transcript, the durable model-facing
//! conversation, and per-turn memory that is committed to the conversation
//! only when a turn finishes cleanly. Worker events arrive tagged with a
//! turn id and are dropped when they refer to a turn that is no longer
//! active or cancelling.

use agent_provider::{RunMessage, ToolResult};
use serde_json::Value;

/// Identifier for one user-visible turn.
pub type TurnId = u64;

pub const ERROR_TURN_ALREADY_ACTIVE: &str = "Turn already active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Running { turn_id: TurnId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One transcript entry. Assistant entries stay `streaming` until their
/// turn reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub streaming: bool,
    pub turn_id: Option<TurnId>,
}

/// Token totals accumulated from provider usage reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageTotals {
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Conversation entries produced by the in-flight turn. Committed on clean
/// completion, discarded on failure, cancellation, or abort.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingTurnMemory {
    turn_id: TurnId,
    entries: Vec<RunMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub mode: Mode,
    pub transcript: Vec<Message>,
    conversation: Vec<RunMessage>,
    pending_turn_memory: Option<PendingTurnMemory>,
    cancelling_turn: Option<TurnId>,
    usage: UsageTotals,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            transcript: Vec::new(),
            conversation: Vec::new(),
            pending_turn_memory: None,
            cancelling_turn: None,
            usage: UsageTotals::default(),
        }
    }

    /// Durable conversation, without the in-flight turn's entries.
    #[must_use]
    pub fn conversation_messages(&self) -> &[RunMessage] {
        &self.conversation
    }

    /// Messages for the next model round-trip: the durable conversation
    /// followed by the in-flight turn's uncommitted entries.
    #[must_use]
    pub fn run_messages(&self) -> Vec<RunMessage> {
        let mut messages = self.conversation.clone();
        if let Some(pending) = &self.pending_turn_memory {
            messages.extend(pending.entries.iter().cloned());
        }
        messages
    }

    #[must_use]
    pub fn usage(&self) -> UsageTotals {
        self.usage
    }

    /// Records the user message and marks the turn running. Fails while
    /// another turn is active or still cancelling.
    pub fn begin_turn(&mut self, turn_id: TurnId, user_text: &str) -> Result<(), String> {
        if matches!(self.mode, Mode::Running { .. }) {
            return Err(ERROR_TURN_ALREADY_ACTIVE.to_string());
        }
        if self.cancelling_turn.is_some() {
            return Err("Previous turn is still cancelling".to_string());
        }

        self.transcript.push(Message {
            role: Role::User,
            content: user_text.to_string(),
            streaming: false,
            turn_id: None,
        });
        self.conversation.push(RunMessage::UserText {
            text: user_text.to_string(),
        });
        self.mode = Mode::Running { turn_id };
        Ok(())
    }

    /// Settles visible state for a host-requested cancel and returns the
    /// turn to signal. Worker events for the turn are still accepted until
    /// its terminal event lands.
    pub fn begin_cancel(&mut self) -> Option<TurnId> {
        if self.cancelling_turn.is_some() {
            return None;
        }
        let Mode::Running { turn_id } = self.mode else {
            return None;
        };

        self.cancelling_turn = Some(turn_id);
        self.finalize_streaming_messages(turn_id);
        self.mode = Mode::Idle;
        self.push_system("Turn cancelled".to_string());
        Some(turn_id)
    }

    pub fn on_turn_started(&mut self, turn_id: TurnId) {
        if !self.is_active_turn(turn_id) {
            return;
        }
        if self.is_cancelling(turn_id) || self.has_assistant_message(turn_id) {
            return;
        }
        self.transcript.push(Message {
            role: Role::Assistant,
            content: String::new(),
            streaming: true,
            turn_id: Some(turn_id),
        });
    }

    pub fn on_text_delta(&mut self, turn_id: TurnId, chunk: &str) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }

        let stream_active = !self.is_cancelling(turn_id);
        if let Some(message) = self
            .transcript
            .iter_mut()
            .rev()
            .find(|message| message.role == Role::Assistant && message.turn_id == Some(turn_id))
        {
            message.content.push_str(chunk);
            if !stream_active {
                message.streaming = false;
            }
        } else {
            self.transcript.push(Message {
                role: Role::Assistant,
                content: chunk.to_string(),
                streaming: stream_active,
                turn_id: Some(turn_id),
            });
        }

        self.append_pending_assistant_text(turn_id, chunk);
    }

    pub fn on_tool_call_started(&mut self, turn_id: TurnId, call_id: &str, tool_name: &str) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }
        self.push_tool(turn_id, format!("Tool {tool_name} ({call_id}) started"));
    }

    /// Records a fully assembled tool call in this turn's pending memory.
    pub fn on_tool_call_completed(
        &mut self,
        turn_id: TurnId,
        call_id: &str,
        tool_name: &str,
        arguments: &Value,
    ) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }
        let pending = self.ensure_pending_turn_memory(turn_id);
        pending.entries.push(RunMessage::ToolCall {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
        });
    }

    /// Records a tool result in pending memory and in the tool timeline.
    pub fn on_tool_result(&mut self, turn_id: TurnId, result: &ToolResult) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }

        let pending = self.ensure_pending_turn_memory(turn_id);
        pending.entries.push(RunMessage::ToolResult {
            call_id: result.call_id.clone(),
            tool_name: result.tool_name.clone(),
            content: result.content.clone(),
            is_error: result.is_error,
        });

        let mut line = format!(
            "Tool {} ({}) {}",
            result.tool_name,
            result.call_id,
            if result.is_error { "failed" } else { "completed" }
        );
        if result.is_error {
            let detail = error_text(&result.content);
            if !detail.is_empty() {
                line.push_str(": ");
                line.push_str(&detail);
            }
        }
        self.push_tool(turn_id, line);
    }

    pub fn record_usage(&mut self, turn_id: TurnId, input_tokens: u64, output_tokens: u64) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }
        self.usage.record(input_tokens, output_tokens);
    }

    pub fn on_turn_finished(&mut self, turn_id: TurnId) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }

        self.finalize_streaming_messages(turn_id);
        if self.is_cancelling(turn_id) {
            // The worker finished before noticing the cancel; the host
            // already settled this turn as cancelled.
            self.discard_pending_turn_memory(turn_id);
            self.finalize_cancelled_turn(turn_id);
            return;
        }

        self.commit_pending_turn_memory(turn_id);
        self.mode = Mode::Idle;
    }

    pub fn on_turn_failed(&mut self, turn_id: TurnId, error: &str) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }

        self.finalize_streaming_messages(turn_id);
        self.discard_pending_turn_memory(turn_id);
        if self.is_cancelling(turn_id) {
            self.finalize_cancelled_turn(turn_id);
            return;
        }

        self.mode = Mode::Idle;
        self.push_system(format!("Turn failed: {error}"));
    }

    pub fn on_turn_cancelled(&mut self, turn_id: TurnId) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }

        self.finalize_streaming_messages(turn_id);
        self.discard_pending_turn_memory(turn_id);
        if self.is_cancelling(turn_id) {
            self.finalize_cancelled_turn(turn_id);
        } else {
            // Provider-initiated cancellation without a host cancel request.
            self.mode = Mode::Idle;
            self.push_system("Turn cancelled".to_string());
        }
    }

    pub fn on_turn_aborted(&mut self, turn_id: TurnId, reason: &str) {
        if !self.should_apply_turn_event(turn_id) {
            return;
        }

        self.finalize_streaming_messages(turn_id);
        self.discard_pending_turn_memory(turn_id);
        if self.is_cancelling(turn_id) {
            self.finalize_cancelled_turn(turn_id);
            return;
        }

        self.mode = Mode::Idle;
        self.push_system(format!("Turn aborted: {reason}"));
    }

    pub fn push_system_message(&mut self, content: impl Into<String>) {
        self.push_system(content.into());
    }

    fn is_active_turn(&self, turn_id: TurnId) -> bool {
        self.mode == (Mode::Running { turn_id })
    }

    fn is_cancelling(&self, turn_id: TurnId) -> bool {
        self.cancelling_turn == Some(turn_id)
    }

    fn should_apply_turn_event(&self, turn_id: TurnId) -> bool {
        self.is_active_turn(turn_id) || self.is_cancelling(turn_id)
    }

    fn has_assistant_message(&self, turn_id: TurnId) -> bool {
        self.transcript
            .iter()
            .any(|message| message.role == Role::Assistant && message.turn_id == Some(turn_id))
    }

    fn ensure_pending_turn_memory(&mut self, turn_id: TurnId) -> &mut PendingTurnMemory {
        if let Some(pending) = &self.pending_turn_memory {
            assert_eq!(
                pending.turn_id, turn_id,
                "pending turn memory belongs to a different turn"
            );
        }
        self.pending_turn_memory
            .get_or_insert_with(|| PendingTurnMemory {
                turn_id,
                entries: Vec::new(),
            })
    }

    /// Merges consecutive assistant text into one entry so replayed
    /// conversations mirror what the user saw.
    fn append_pending_assistant_text(&mut self, turn_id: TurnId, chunk: &str) {
        let pending = self.ensure_pending_turn_memory(turn_id);
        if let Some(RunMessage::AssistantText { text }) = pending.entries.last_mut() {
            text.push_str(chunk);
        } else {
            pending.entries.push(RunMessage::AssistantText {
                text: chunk.to_string(),
            });
        }
    }

    fn commit_pending_turn_memory(&mut self, turn_id: TurnId) {
        let Some(pending) = self.pending_turn_memory.take() else {
            return;
        };
        assert_eq!(
            pending.turn_id, turn_id,
            "committing pending memory for a different turn"
        );
        self.conversation.extend(pending.entries);
    }

    fn discard_pending_turn_memory(&mut self, turn_id: TurnId) {
        let Some(pending) = &self.pending_turn_memory else {
            return;
        };
        assert_eq!(
            pending.turn_id, turn_id,
            "discarding pending memory for a different turn"
        );
        self.pending_turn_memory = None;
    }

    fn finalize_cancelled_turn(&mut self, turn_id: TurnId) {
        if self.cancelling_turn == Some(turn_id) {
            self.cancelling_turn = None;
        }
        if self.mode == (Mode::Running { turn_id }) {
            self.mode = Mode::Idle;
        }
    }

    fn finalize_streaming_messages(&mut self, turn_id: TurnId) {
        for message in &mut self.transcript {
            if message.turn_id == Some(turn_id) {
                message.streaming = false;
            }
        }
    }

    fn push_tool(&mut self, turn_id: TurnId, content: String) {
        self.transcript.push(Message {
            role: Role::Tool,
            content,
            streaming: false,
            turn_id: Some(turn_id),
        });
    }

    fn push_system(&mut self, content: String) {
        self.transcript.push(Message {
            role: Role::System,
            content,
            streaming: false,
            turn_id: None,
        });
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn error_text(content: &Value) -> String {
    if let Some(text) = content.as_str() {
        return text.to_string();
    }
    content
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn running_session(turn_id: TurnId) -> Session {
        let mut session = Session::new();
        session
            .begin_turn(turn_id, "change the heading")
            .expect("turn should begin");
        session
    }

    fn tool_result(is_error: bool, content: Value) -> ToolResult {
        ToolResult {
            call_id: "call-1".to_string(),
            tool_name: "generate_json_patch".to_string(),
            is_error,
            content,
        }
    }

    #[test]
    fn begin_turn_records_user_message_everywhere() {
        let session = running_session(1);

        assert_eq!(session.mode, Mode::Running { turn_id: 1 });
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.transcript[0].role, Role::User);
        assert_eq!(session.transcript[0].content, "change the heading");
        assert_eq!(
            session.conversation_messages(),
            &[RunMessage::UserText {
                text: "change the heading".to_string(),
            }]
        );
    }

    #[test]
    fn begin_turn_rejects_while_running() {
        let mut session = running_session(1);

        let result = session.begin_turn(2, "another request");

        assert_eq!(result, Err(ERROR_TURN_ALREADY_ACTIVE.to_string()));
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.conversation_messages().len(), 1);
    }

    #[test]
    fn begin_turn_rejects_while_cancelling() {
        let mut session = running_session(1);
        assert_eq!(session.begin_cancel(), Some(1));

        let result = session.begin_turn(2, "another request");

        assert!(result.is_err());
        assert_ne!(result, Err(ERROR_TURN_ALREADY_ACTIVE.to_string()));
    }

    #[test]
    fn text_deltas_stream_into_one_assistant_message() {
        let mut session = running_session(1);
        session.on_turn_started(1);
        session.on_text_delta(1, "I will ");
        session.on_text_delta(1, "update the heading.");

        let assistant: Vec<&Message> = session
            .transcript
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .collect();
        assert_eq!(assistant.len(), 1);
        assert_eq!(assistant[0].content, "I will update the heading.");
        assert!(assistant[0].streaming);
    }

    #[test]
    fn started_twice_keeps_a_single_assistant_message() {
        let mut session = running_session(1);
        session.on_turn_started(1);
        session.on_text_delta(1, "step one");
        session.on_turn_started(1);

        let assistant_count = session
            .transcript
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .count();
        assert_eq!(assistant_count, 1);
    }

    #[test]
    fn stale_turn_events_are_dropped() {
        let mut session = running_session(2);

        session.on_text_delta(1, "late chunk");
        session.on_tool_call_started(1, "call-9", "analyze_json_structure");
        session.record_usage(1, 100, 100);

        assert!(session
            .transcript
            .iter()
            .all(|message| message.role != Role::Tool));
        assert!(!session
            .transcript
            .iter()
            .any(|message| message.content.contains("late chunk")));
        assert_eq!(session.usage(), UsageTotals::default());
    }

    #[test]
    fn finished_turn_commits_pending_memory() {
        let mut session = running_session(1);
        session.on_turn_started(1);
        session.on_text_delta(1, "Proposing a patch.");
        session.on_tool_call_completed(1, "call-1", "generate_json_patch", &json!({"patches": []}));
        session.on_tool_result(1, &tool_result(false, json!({"status": "pending_approval"})));
        session.on_text_delta(1, " Waiting for approval.");

        session.on_turn_finished(1);

        assert_eq!(session.mode, Mode::Idle);
        let conversation = session.conversation_messages();
        assert_eq!(conversation.len(), 5);
        assert!(matches!(
            &conversation[1],
            RunMessage::AssistantText { text } if text == "Proposing a patch."
        ));
        assert!(matches!(&conversation[2], RunMessage::ToolCall { .. }));
        assert!(matches!(&conversation[3], RunMessage::ToolResult { .. }));
        assert!(matches!(
            &conversation[4],
            RunMessage::AssistantText { text } if text == " Waiting for approval."
        ));
    }

    #[test]
    fn run_messages_include_uncommitted_entries() {
        let mut session = running_session(1);
        session.on_text_delta(1, "thinking");

        let messages = session.run_messages();

        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[1],
            RunMessage::AssistantText { text } if text == "thinking"
        ));
        assert_eq!(session.conversation_messages().len(), 1);
    }

    #[test]
    fn failed_turn_discards_pending_memory_but_keeps_user_text() {
        let mut session = running_session(1);
        session.on_text_delta(1, "half an answer");

        session.on_turn_failed(1, "stream reset");

        assert_eq!(session.mode, Mode::Idle);
        assert_eq!(session.conversation_messages().len(), 1);
        assert!(matches!(
            &session.conversation_messages()[0],
            RunMessage::UserText { .. }
        ));
        let last = session.transcript.last().expect("transcript has entries");
        assert_eq!(last.role, Role::System);
        assert_eq!(last.content, "Turn failed: stream reset");
    }

    #[test]
    fn cancel_settles_immediately_and_finalizes_stream() {
        let mut session = running_session(1);
        session.on_turn_started(1);
        session.on_text_delta(1, "working on it");

        assert_eq!(session.begin_cancel(), Some(1));

        assert_eq!(session.mode, Mode::Idle);
        let assistant = session
            .transcript
            .iter()
            .find(|message| message.role == Role::Assistant)
            .expect("assistant message exists");
        assert!(!assistant.streaming);
        let last = session.transcript.last().expect("transcript has entries");
        assert_eq!(last.content, "Turn cancelled");

        // Late worker events still apply while the cancel drains.
        session.on_text_delta(1, " - stopped");
        assert!(session
            .transcript
            .iter()
            .any(|message| message.content == "working on it - stopped"));

        session.on_turn_cancelled(1);
        assert_eq!(session.conversation_messages().len(), 1);
    }

    #[test]
    fn repeated_cancel_is_ignored() {
        let mut session = running_session(1);
        assert_eq!(session.begin_cancel(), Some(1));
        assert_eq!(session.begin_cancel(), None);

        let cancel_messages = session
            .transcript
            .iter()
            .filter(|message| message.content == "Turn cancelled")
            .count();
        assert_eq!(cancel_messages, 1);
    }

    #[test]
    fn aborted_turn_discards_memory_and_reports_reason() {
        let mut session = running_session(1);
        session.on_tool_call_completed(1, "call-1", "analyze_json_structure", &json!({}));

        session.on_turn_aborted(1, "step limit reached");

        assert_eq!(session.mode, Mode::Idle);
        assert_eq!(session.conversation_messages().len(), 1);
        let last = session.transcript.last().expect("transcript has entries");
        assert_eq!(last.role, Role::System);
        assert_eq!(last.content, "Turn aborted: step limit reached");
    }

    #[test]
    fn tool_timeline_reports_start_and_failure_detail() {
        let mut session = running_session(1);
        session.on_tool_call_started(1, "call-1", "generate_json_patch");
        session.on_tool_result(1, &tool_result(true, json!({"error": "patch validation failed"})));

        let tool_lines: Vec<&str> = session
            .transcript
            .iter()
            .filter(|message| message.role == Role::Tool)
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(
            tool_lines,
            vec![
                "Tool generate_json_patch (call-1) started",
                "Tool generate_json_patch (call-1) failed: patch validation failed",
            ]
        );
    }

    #[test]
    fn usage_accumulates_across_reports() {
        let mut session = running_session(1);
        session.record_usage(1, 120, 40);
        session.record_usage(1, 80, 10);

        assert_eq!(
            session.usage(),
            UsageTotals {
                input_tokens: 200,
                output_tokens: 50,
            }
        );
        assert_eq!(session.usage().total_tokens(), 250);
    }
}
