use serde::{Deserialize, Serialize};

/// Canonical terminal state mapped from streamed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    Incomplete,
    Failed,
    Cancelled,
    Queued,
    InProgress,
}

impl ResponseStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
        }
    }
}

/// Token counts reported by the terminal `response.completed` frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Stream event emitted by the parser after normalization.
///
/// Function-call items surface as a started/arguments/completed triplet;
/// the parser accumulates argument fragments per item so `ToolCallCompleted`
/// always carries the full argument string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApiStreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.function_call.started")]
    ToolCallStarted {
        item_id: Option<String>,
        call_id: Option<String>,
        tool_name: Option<String>,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    ToolCallArgumentsDelta {
        item_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.function_call.completed")]
    ToolCallCompleted {
        item_id: Option<String>,
        call_id: Option<String>,
        tool_name: Option<String>,
        /// Full accumulated argument string from the wire; JSON parsing is
        /// the consumer's responsibility.
        arguments: String,
    },
    #[serde(rename = "response.completed")]
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<ResponseStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageTotals>,
    },
    #[serde(rename = "response.failed")]
    Failed { message: Option<String> },
    #[serde(rename = "error")]
    Error {
        code: Option<String>,
        message: Option<String>,
    },
    /// Recognized frame with an event type nothing upstream consumes.
    #[serde(rename = "unknown")]
    Unknown { event_type: String },
}
