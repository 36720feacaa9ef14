use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical request payload shape for the streaming responses endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input: Value,
    /// Default: false.
    #[serde(default)]
    pub store: bool,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(default)]
    pub parallel_tool_calls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

fn default_true() -> bool {
    true
}

impl ResponsesRequest {
    pub fn new(
        model: impl Into<String>,
        input: impl Into<Value>,
        instructions: Option<String>,
    ) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            instructions,
            store: false,
            stream: true,
            tool_choice: Some("auto".to_string()),
            parallel_tool_calls: true,
            max_output_tokens: None,
            temperature: None,
            tools: Vec::new(),
        }
    }
}
