use responses_api::events::{ApiStreamEvent, ResponseStatus, UsageTotals};

#[test]
fn events_status_string_round_trip() {
    assert_eq!(
        ResponseStatus::parse("completed"),
        Some(ResponseStatus::Completed)
    );
    assert_eq!(
        ResponseStatus::parse("in_progress"),
        Some(ResponseStatus::InProgress)
    );
    assert_eq!(ResponseStatus::parse("queued"), Some(ResponseStatus::Queued));
    assert_eq!(ResponseStatus::parse("unknown"), None);
    assert_eq!(ResponseStatus::Incomplete.as_str(), "incomplete");
}

#[test]
fn completed_event_serializes_status_and_usage() {
    let event = ApiStreamEvent::Completed {
        status: Some(ResponseStatus::Completed),
        usage: Some(UsageTotals {
            input_tokens: 210,
            output_tokens: 34,
        }),
    };

    let json = serde_json::to_value(&event).expect("serialize completed event");
    assert_eq!(json["type"], "response.completed");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["usage"]["input_tokens"], 210);
    assert_eq!(json["usage"]["output_tokens"], 34);
}

#[test]
fn tool_call_completed_preserves_argument_string() {
    let event = ApiStreamEvent::ToolCallCompleted {
        item_id: Some("fc_1".to_string()),
        call_id: Some("call_1".to_string()),
        tool_name: Some("generate_json_patch".to_string()),
        arguments: r#"{"patches":[],"summary":"noop"}"#.to_string(),
    };

    let json = serde_json::to_value(&event).expect("serialize tool call event");
    assert_eq!(json["type"], "response.function_call.completed");
    assert_eq!(json["call_id"], "call_1");
    assert_eq!(json["tool_name"], "generate_json_patch");
    assert_eq!(json["arguments"], r#"{"patches":[],"summary":"noop"}"#);
}

#[test]
fn usage_totals_tolerate_missing_fields() {
    let usage: UsageTotals =
        serde_json::from_str(r#"{"input_tokens": 12}"#).expect("partial usage should parse");
    assert_eq!(usage.input_tokens, 12);
    assert_eq!(usage.output_tokens, 0);
}
