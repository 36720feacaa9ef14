use responses_api::retry::*;

#[test]
fn retry_http_status_is_retryable() {
    assert!(is_retryable_http_error(429, ""));
    assert!(is_retryable_http_error(500, ""));
    assert!(is_retryable_http_error(502, ""));
    assert!(is_retryable_http_error(503, ""));
    assert!(is_retryable_http_error(504, ""));
    assert!(!is_retryable_http_error(400, ""));
    assert!(!is_retryable_http_error(401, ""));
}

#[test]
fn retry_error_text_pattern_is_retryable() {
    assert!(retryable_error_text("rate limit exceeded"));
    assert!(retryable_error_text("connection refused"));
    assert!(retryable_error_text("connection reset by peer"));
    assert!(retryable_error_text("request timed out"));
    assert!(retryable_error_text("model overloaded"));
    assert!(!retryable_error_text("invalid api key"));
}

#[test]
fn retry_delay_is_exponential() {
    assert_eq!(retry_delay_ms(0).as_millis(), 1000);
    assert_eq!(retry_delay_ms(1).as_millis(), 2000);
    assert_eq!(retry_delay_ms(2).as_millis(), 4000);
}
