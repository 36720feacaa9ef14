//! Responses API-backed implementation of the shared `agent_provider`
//! contract.
//!
//! This adapter translates `responses_api` stream semantics into
//! deterministic `RunEvent` lifecycle events: text deltas, the tool-call
//! started/fragment/completed triplet, usage reports, and exactly one
//! terminal event per run. Tool calls are surfaced to the caller; the
//! adapter never executes anything itself.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_provider::{
    CancelSignal, ProviderInitError, ProviderProfile, RunEvent, RunMessage, RunProvider,
    RunRequest, ToolDefinition,
};
use responses_api::client::StreamOutcome;
use responses_api::{
    ApiConfig, ApiError, ApiStreamEvent, ResponseStatus, ResponsesClient, ResponsesRequest,
};
use serde_json::{json, Value};
use url::Url;

/// Stable provider identifier used by host startup selection.
pub const RESPONSES_API_PROVIDER_ID: &str = "responses-api";

const FALLBACK_MODEL_ID: &str = "gpt-4.1";

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectionState {
    model_index: usize,
}

/// Runtime configuration for the Responses API provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsesApiProviderConfig {
    pub api_key: String,
    pub model_ids: Vec<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub extra_headers: BTreeMap<String, String>,
}

impl ResponsesApiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model_ids: Vec<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_ids,
            base_url: None,
            timeout: None,
            extra_headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    fn into_api_config(self) -> Result<ApiConfig, ProviderInitError> {
        let mut config = ApiConfig::new(self.api_key);

        if let Some(base_url) = self.base_url {
            let parsed = Url::parse(base_url.trim())
                .map_err(|error| ProviderInitError::new(format!("invalid base URL: {error}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ProviderInitError::new(format!(
                    "invalid base URL: unsupported scheme '{}'",
                    parsed.scheme()
                )));
            }
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        Ok(config.with_headers(self.extra_headers))
    }
}

trait StreamClient: Send + Sync {
    fn stream_events(
        &self,
        request: &ResponsesRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ApiStreamEvent),
    ) -> Result<StreamOutcome, ApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: ResponsesClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream_events(
        &self,
        request: &ResponsesRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ApiStreamEvent),
    ) -> Result<StreamOutcome, ApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), on_event),
        )
    }
}

/// `RunProvider` adapter backed by `responses_api` transport primitives.
pub struct ResponsesApiProvider {
    model_ids: Vec<String>,
    selection: Mutex<SelectionState>,
    stream_client: Arc<dyn StreamClient>,
}

impl ResponsesApiProvider {
    /// Creates a provider using real streaming transport.
    pub fn new(config: ResponsesApiProviderConfig) -> Result<Self, ProviderInitError> {
        let model_ids = sanitize_model_ids(config.model_ids.clone());
        let stream_client = Arc::new(DefaultStreamClient {
            client: ResponsesClient::new(config.into_api_config()?).map_err(map_init_error)?,
        });

        Ok(Self {
            model_ids,
            selection: Mutex::new(SelectionState { model_index: 0 }),
            stream_client,
        })
    }

    fn selected_model(&self) -> String {
        let selection = lock_unpoisoned(&self.selection);
        self.model_ids[selection.model_index].clone()
    }

    fn build_request(&self, req: &RunRequest) -> ResponsesRequest {
        let instructions = if req.instructions.trim().is_empty() {
            None
        } else {
            Some(req.instructions.clone())
        };
        let mut request =
            ResponsesRequest::new(self.selected_model(), build_input_items(&req.messages), instructions);
        request.tools = build_tool_entries(&req.tools);
        request
    }

    fn emit_terminal_event(
        &self,
        run_id: u64,
        terminal: Option<ResponseStatus>,
        emit: &mut dyn FnMut(RunEvent),
    ) {
        match terminal {
            Some(ResponseStatus::Completed) => emit(RunEvent::Finished { run_id }),
            Some(ResponseStatus::Cancelled) => emit(RunEvent::Cancelled { run_id }),
            Some(status) => emit(RunEvent::Failed {
                run_id,
                error: format!(
                    "response ended with non-complete terminal status '{}'",
                    status.as_str()
                ),
                retryable: false,
            }),
            None => emit(RunEvent::Failed {
                run_id,
                error: "stream ended without terminal status".to_string(),
                retryable: true,
            }),
        }
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(
        model_ids: Vec<String>,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        Self {
            model_ids: sanitize_model_ids(model_ids),
            selection: Mutex::new(SelectionState { model_index: 0 }),
            stream_client,
        }
    }
}

impl RunProvider for ResponsesApiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: RESPONSES_API_PROVIDER_ID.to_string(),
            model_id: self.selected_model(),
        }
    }

    fn cycle_model(&self) -> Result<ProviderProfile, String> {
        let mut selection = lock_unpoisoned(&self.selection);
        selection.model_index = (selection.model_index + 1) % self.model_ids.len();
        drop(selection);

        Ok(self.profile())
    }

    fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;

        emit(RunEvent::Started { run_id });

        if cancel.load(Ordering::Acquire) {
            emit(RunEvent::Cancelled { run_id });
            return Ok(());
        }

        let request = self.build_request(&req);
        let mut forwarder = EventForwarder::default();
        let result = self
            .stream_client
            .stream_events(&request, &cancel, &mut |event| {
                forwarder.forward(run_id, event, emit);
            });

        match result {
            Ok(outcome) => self.emit_terminal_event(run_id, outcome.terminal(), emit),
            Err(ApiError::Cancelled) => emit(RunEvent::Cancelled { run_id }),
            Err(error) => {
                let retryable = error.is_retryable();
                emit(RunEvent::Failed {
                    run_id,
                    error: format!("request failed: {error}"),
                    retryable,
                });
            }
        }

        Ok(())
    }
}

/// Live mapping of transport stream events onto `RunEvent`s.
///
/// Argument fragments are forwarded as they arrive; when the completed
/// item carries a longer authoritative argument string than the fragments
/// seen so far, the remainder is emitted as a final fragment so consumers
/// that accumulate fragments always end up with the full string.
#[derive(Default)]
struct EventForwarder {
    calls: BTreeMap<String, ForwardedCall>,
}

#[derive(Default)]
struct ForwardedCall {
    call_id: String,
    forwarded_bytes: usize,
}

impl EventForwarder {
    fn forward(&mut self, run_id: u64, event: ApiStreamEvent, emit: &mut dyn FnMut(RunEvent)) {
        match event {
            ApiStreamEvent::OutputTextDelta { delta } => {
                if !delta.is_empty() {
                    emit(RunEvent::TextDelta {
                        run_id,
                        text: delta,
                    });
                }
            }
            ApiStreamEvent::ToolCallStarted {
                item_id,
                call_id,
                tool_name,
            } => {
                let item_key = item_id.unwrap_or_default();
                let call_id = call_id.unwrap_or_else(|| item_key.clone());
                self.calls.insert(
                    item_key,
                    ForwardedCall {
                        call_id: call_id.clone(),
                        forwarded_bytes: 0,
                    },
                );
                emit(RunEvent::ToolCallStarted {
                    run_id,
                    call_id,
                    tool_name: tool_name.unwrap_or_default(),
                });
            }
            ApiStreamEvent::ToolCallArgumentsDelta { item_id, delta } => {
                let entry = self.calls.entry(item_id.unwrap_or_default()).or_default();
                entry.forwarded_bytes += delta.len();
                emit(RunEvent::ToolCallArgumentsDelta {
                    run_id,
                    call_id: entry.call_id.clone(),
                    fragment: delta,
                });
            }
            ApiStreamEvent::ToolCallCompleted {
                item_id,
                call_id,
                arguments,
                ..
            } => {
                let item_key = item_id.unwrap_or_default();
                let state = self.calls.remove(&item_key).unwrap_or_default();
                let call_id = call_id.or_else(|| {
                    if state.call_id.is_empty() {
                        None
                    } else {
                        Some(state.call_id.clone())
                    }
                });
                let call_id = call_id.unwrap_or(item_key);

                if arguments.len() > state.forwarded_bytes {
                    emit(RunEvent::ToolCallArgumentsDelta {
                        run_id,
                        call_id: call_id.clone(),
                        fragment: arguments[state.forwarded_bytes..].to_string(),
                    });
                }
                emit(RunEvent::ToolCallCompleted { run_id, call_id });
            }
            ApiStreamEvent::Completed { usage, .. } => {
                if let Some(usage) = usage {
                    emit(RunEvent::UsageReported {
                        run_id,
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    });
                }
            }
            ApiStreamEvent::Failed { .. }
            | ApiStreamEvent::Error { .. }
            | ApiStreamEvent::Unknown { .. } => {}
        }
    }
}

/// Serialize the neutral message history into Responses API input items.
fn build_input_items(messages: &[RunMessage]) -> Value {
    let items: Vec<Value> = messages
        .iter()
        .map(|message| match message {
            RunMessage::UserText { text } => json!({
                "role": "user",
                "content": [{"type": "input_text", "text": text}],
            }),
            RunMessage::AssistantText { text } => json!({
                "role": "assistant",
                "content": [{"type": "output_text", "text": text}],
            }),
            RunMessage::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => json!({
                "type": "function_call",
                "call_id": call_id,
                "name": tool_name,
                "arguments": compact_json_string(arguments),
            }),
            RunMessage::ToolResult {
                call_id, content, ..
            } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output_string(content),
            }),
        })
        .collect();

    Value::Array(items)
}

fn build_tool_entries(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let mut entry = json!({
                "type": "function",
                "name": tool.name,
                "parameters": tool.input_schema,
            });
            if let (Some(description), Some(object)) = (&tool.description, entry.as_object_mut()) {
                object.insert("description".to_string(), json!(description));
            }
            entry
        })
        .collect()
}

fn compact_json_string(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn output_string(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        other => compact_json_string(other),
    }
}

fn sanitize_model_ids(model_ids: Vec<String>) -> Vec<String> {
    let mut sanitized: Vec<String> = model_ids
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();

    if sanitized.is_empty() {
        sanitized.push(FALLBACK_MODEL_ID.to_string());
    }

    sanitized
}

fn map_init_error(error: ApiError) -> ProviderInitError {
    ProviderInitError::new(format!(
        "Failed to initialize responses-api provider: {error}"
    ))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
