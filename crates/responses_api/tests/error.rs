use reqwest::StatusCode;

use responses_api::error::parse_error_message;
use responses_api::ApiError;

#[test]
fn parse_error_message_extracts_nested_message() {
    let body = r#"{"error":{"code":"bad_request","message":"invalid model"}}"#;
    let message = parse_error_message(StatusCode::BAD_REQUEST, body);
    assert_eq!(message, "invalid model");
}

#[test]
fn parse_error_message_falls_back_to_code_then_type() {
    let body = r#"{"error":{"code":"rate_limit_exceeded"}}"#;
    let message = parse_error_message(StatusCode::TOO_MANY_REQUESTS, body);
    assert_eq!(message, "rate_limit_exceeded");

    let body = r#"{"error":{"type":"server_error"}}"#;
    let message = parse_error_message(StatusCode::INTERNAL_SERVER_ERROR, body);
    assert_eq!(message, "server_error");
}

#[test]
fn parse_error_message_falls_back_to_raw_body() {
    let body = "raw failure text";
    let message = parse_error_message(StatusCode::INTERNAL_SERVER_ERROR, body);
    assert_eq!(message, "raw failure text");
}

#[test]
fn parse_error_message_uses_canonical_reason_for_empty_body() {
    let message = parse_error_message(StatusCode::SERVICE_UNAVAILABLE, "");
    assert_eq!(message, "Service Unavailable");
}

#[test]
fn retryability_classification_spares_configuration_errors() {
    assert!(!ApiError::MissingApiKey.is_retryable());
    assert!(!ApiError::InvalidBaseUrl("nope".to_owned()).is_retryable());
    assert!(!ApiError::Cancelled.is_retryable());
    assert!(!ApiError::InvalidRequestPayload("'input' must be a list".to_owned()).is_retryable());
}

#[test]
fn retryability_classification_flags_transient_failures() {
    assert!(ApiError::Status(
        StatusCode::TOO_MANY_REQUESTS,
        "rate limit exceeded".to_owned()
    )
    .is_retryable());
    assert!(ApiError::RetryExhausted {
        status: None,
        last_error: Some("connection refused".to_owned()),
    }
    .is_retryable());
    assert!(ApiError::StreamFailed {
        code: None,
        message: "model overloaded, please retry".to_owned(),
    }
    .is_retryable());
    assert!(!ApiError::StreamFailed {
        code: Some("invalid_request".to_owned()),
        message: "tool schema rejected".to_owned(),
    }
    .is_retryable());
}
