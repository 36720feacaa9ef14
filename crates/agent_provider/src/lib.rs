//! Minimal provider-agnostic contract for executing a single model
//! round-trip.
//!
//! This crate defines only the shared run lifecycle and streaming
//! tool-call contract types. It excludes provider transport details,
//! protocol payloads, and multi-step orchestration: one `run` is one
//! request/stream cycle, and the orchestrator above decides whether tool
//! results warrant another.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde_json::Value;

/// Identifier for one provider run (one model round-trip).
pub type RunId = u64;

/// Shared cancellation flag for a run.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a provider before any run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Provider-neutral model-facing message history item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMessage {
    UserText {
        text: String,
    },
    AssistantText {
        text: String,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: Value,
        is_error: bool,
    },
}

/// Input required to start a provider run. `tools` is the registry's
/// definition list for this round-trip; the provider advertises it to the
/// model but never executes anything itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub run_id: RunId,
    pub messages: Vec<RunMessage>,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

/// Tool made available to the model for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// One fully assembled tool call the model requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Executed tool outcome, fed back to the model on the next round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub is_error: bool,
    pub content: Value,
}

impl ToolResult {
    /// Constructs a successful tool result.
    #[must_use]
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            is_error: false,
            content: content.into(),
        }
    }

    /// Constructs a tool error result.
    #[must_use]
    pub fn error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            is_error: true,
            content: content.into(),
        }
    }
}

/// Provider-emitted lifecycle event for a run.
///
/// Tool calls stream in three phases: `ToolCallStarted` names the call,
/// `ToolCallArgumentsDelta` carries raw argument-string fragments in
/// arrival order, and `ToolCallCompleted` marks the call assembled. The
/// consumer accumulates fragments per `call_id` and parses them only after
/// completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started {
        run_id: RunId,
    },
    TextDelta {
        run_id: RunId,
        text: String,
    },
    ToolCallStarted {
        run_id: RunId,
        call_id: String,
        tool_name: String,
    },
    ToolCallArgumentsDelta {
        run_id: RunId,
        call_id: String,
        fragment: String,
    },
    ToolCallCompleted {
        run_id: RunId,
        call_id: String,
    },
    UsageReported {
        run_id: RunId,
        input_tokens: u64,
        output_tokens: u64,
    },
    Finished {
        run_id: RunId,
    },
    Failed {
        run_id: RunId,
        error: String,
        /// Whether retrying the whole turn could plausibly succeed
        /// (rate limits, transient transport faults). The orchestrator
        /// surfaces this to the host; it never retries on its own.
        retryable: bool,
    },
    Cancelled {
        run_id: RunId,
    },
}

impl RunEvent {
    /// Returns the run identifier associated with this event.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Started { run_id }
            | Self::TextDelta { run_id, .. }
            | Self::ToolCallStarted { run_id, .. }
            | Self::ToolCallArgumentsDelta { run_id, .. }
            | Self::ToolCallCompleted { run_id, .. }
            | Self::UsageReported { run_id, .. }
            | Self::Finished { run_id }
            | Self::Failed { run_id, .. }
            | Self::Cancelled { run_id } => *run_id,
        }
    }

    /// Returns true when this event terminates the run lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Immutable metadata describing a run provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for executing one run request.
pub trait RunProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Cycles to the next model selection for future runs.
    ///
    /// Providers may return an error when model cycling is unsupported.
    fn cycle_model(&self) -> Result<ProviderProfile, String> {
        Err("Model cycling is not supported by this provider".to_string())
    }

    /// Executes one round-trip and emits lifecycle events in provider order.
    ///
    /// Providers must emit `Started` first and exactly one terminal event
    /// (`Finished`, `Failed`, or `Cancelled`), and must observe `cancel`
    /// between emissions.
    fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String>;
}
