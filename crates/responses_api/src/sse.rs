use std::collections::BTreeMap;

use serde_json::Value;

use crate::events::{ApiStreamEvent, ResponseStatus, UsageTotals};

/// Incremental parser for SSE text streams.
///
/// Frames that cannot be decoded (broken JSON, missing type or item fields)
/// are dropped without interrupting the stream; `skipped_frames` counts them
/// so callers can surface a warning.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
    skipped_frames: usize,
    pending_calls: BTreeMap<String, PendingToolCall>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    call_id: Option<String>,
    tool_name: Option<String>,
    arguments: String,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ApiStreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" || payload.is_empty() {
                    continue;
                }

                match serde_json::from_str::<Value>(&payload) {
                    Ok(value) => {
                        if let Some(event) = self.map_event(value) {
                            events.push(event);
                        }
                    }
                    Err(_) => self.skipped_frames += 1,
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<ApiStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }

    /// Count of frames dropped as undecodable since construction.
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    fn map_event(&mut self, value: Value) -> Option<ApiStreamEvent> {
        let Some(event_type) = value.get("type").and_then(Value::as_str) else {
            self.skipped_frames += 1;
            return None;
        };

        match event_type {
            "response.output_text.delta" | "response.content_part.delta" => {
                let delta = value
                    .get("delta")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        value
                            .get("part")
                            .and_then(|part| part.get("text"))
                            .and_then(Value::as_str)
                    })
                    .unwrap_or("");
                Some(ApiStreamEvent::OutputTextDelta {
                    delta: delta.to_owned(),
                })
            }
            "response.output_item.added" => {
                let Some(item) = value.get("item") else {
                    self.skipped_frames += 1;
                    return None;
                };
                if item.get("type").and_then(Value::as_str) != Some("function_call") {
                    return None;
                }

                let item_id = string_field(item, "id");
                let call_id = string_field(item, "call_id");
                let tool_name = string_field(item, "name");
                let entry = self
                    .pending_calls
                    .entry(item_id.clone().unwrap_or_default())
                    .or_default();
                entry.call_id = call_id.clone();
                entry.tool_name = tool_name.clone();
                if let Some(seed) = string_field(item, "arguments") {
                    entry.arguments = seed;
                }

                Some(ApiStreamEvent::ToolCallStarted {
                    item_id,
                    call_id,
                    tool_name,
                })
            }
            "response.function_call_arguments.delta" => {
                let item_id = string_field(&value, "item_id");
                let delta = value
                    .get("delta")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_owned();
                self.pending_calls
                    .entry(item_id.clone().unwrap_or_default())
                    .or_default()
                    .arguments
                    .push_str(&delta);

                Some(ApiStreamEvent::ToolCallArgumentsDelta { item_id, delta })
            }
            "response.output_item.done" => {
                let Some(item) = value.get("item") else {
                    self.skipped_frames += 1;
                    return None;
                };
                if item.get("type").and_then(Value::as_str) != Some("function_call") {
                    return None;
                }

                let item_id = string_field(item, "id");
                let pending = self
                    .pending_calls
                    .remove(item_id.as_deref().unwrap_or_default())
                    .unwrap_or_default();
                let arguments = string_field(item, "arguments")
                    .filter(|args| !args.is_empty())
                    .unwrap_or(pending.arguments);

                Some(ApiStreamEvent::ToolCallCompleted {
                    item_id,
                    call_id: string_field(item, "call_id").or(pending.call_id),
                    tool_name: string_field(item, "name").or(pending.tool_name),
                    arguments,
                })
            }
            "response.completed" | "response.done" => {
                let response = value.get("response");
                let status = response
                    .and_then(|response| response.get("status"))
                    .and_then(Value::as_str)
                    .and_then(ResponseStatus::parse);
                let usage = response
                    .and_then(|response| response.get("usage"))
                    .or_else(|| value.get("usage"))
                    .cloned()
                    .and_then(|usage| serde_json::from_value::<UsageTotals>(usage).ok());

                Some(ApiStreamEvent::Completed { status, usage })
            }
            "response.failed" => {
                let message = value
                    .get("response")
                    .and_then(|response| response.get("error"))
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
                Some(ApiStreamEvent::Failed { message })
            }
            "error" => {
                let code = string_field(&value, "code");
                let message = string_field(&value, "message");
                Some(ApiStreamEvent::Error { code, message })
            }
            other => Some(ApiStreamEvent::Unknown {
                event_type: other.to_owned(),
            }),
        }
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::SseStreamParser;

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut events = Vec::new();

        events.extend(
            parser.feed(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hello\"}\n\n"),
        );
        assert_eq!(events.len(), 1);

        events.extend(parser.feed(b"data: [DONE]\n\n"));
        assert_eq!(events.len(), 1);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn undecodable_frames_bump_the_skip_counter() {
        let mut parser = SseStreamParser::default();

        let events = parser.feed(b"data: {broken\n\ndata: {\"no_type\":true}\n\n");
        assert!(events.is_empty());
        assert_eq!(parser.skipped_frames(), 2);
    }
}
