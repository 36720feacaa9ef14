use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

use crate::retry::{is_retryable_http_error, retryable_error_text};

#[derive(Debug)]
pub enum ApiError {
    MissingApiKey,
    InvalidBaseUrl(String),
    InvalidRequestPayload(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    MalformedSse(String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed {
        code: Option<String>,
        message: String,
    },
    Cancelled,
    JoinError(String),
    Unknown(String),
}

impl ApiError {
    /// Whether retrying the request later could plausibly succeed.
    ///
    /// Connect faults, timeouts, retryable HTTP statuses, and transient
    /// error text qualify; configuration and payload errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(error) => error.is_connect() || error.is_timeout(),
            Self::Status(status, message) => is_retryable_http_error(status.as_u16(), message),
            Self::RetryExhausted { .. } => true,
            Self::StreamFailed { message, .. } => retryable_error_text(message),
            Self::MissingApiKey
            | Self::InvalidBaseUrl(_)
            | Self::InvalidRequestPayload(_)
            | Self::MalformedSse(_)
            | Self::Serde(_)
            | Self::Cancelled
            | Self::JoinError(_)
            | Self::Unknown(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

impl ErrorPayloadFields {
    pub fn message_or_code(&self) -> Option<String> {
        self.message
            .as_deref()
            .and_then(non_empty_string)
            .or_else(|| self.code.as_deref().and_then(non_empty_string))
            .or_else(|| self.type_.as_deref().and_then(non_empty_string))
            .map(ToOwned::to_owned)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "api key is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidRequestPayload(message) => {
                write!(f, "invalid request payload: {message}")
            }
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::MalformedSse(message) => write!(f, "malformed SSE event: {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(f, "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})")
            }
            Self::StreamFailed { code, message } => match code {
                Some(code) if !code.trim().is_empty() => {
                    write!(f, "stream failed ({code}): {message}")
                }
                _ => write!(f, "stream failed: {message}"),
            },
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::JoinError(message) => write!(f, "stream join failure: {message}"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a human-readable message from an HTTP error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let parsed = match serde_json::from_str::<ErrorPayload>(body) {
        Ok(payload) => payload,
        Err(_) => {
            return fallback_message(status, body);
        }
    };

    if let Some(error) = parsed.value {
        if let Some(message) = error.message_or_code() {
            return message;
        }
    }

    fallback_message(status, body)
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
