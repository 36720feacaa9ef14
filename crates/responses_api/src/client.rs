use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};

use crate::config::ApiConfig;
use crate::error::{parse_error_message, ApiError};
use crate::events::{ApiStreamEvent, ResponseStatus, UsageTotals};
use crate::headers::build_headers;
use crate::payload::ResponsesRequest;
use crate::retry::is_retryable_http_error;
use crate::retry::{retry_delay_ms, MAX_RETRIES};
use crate::sse::SseStreamParser;
use crate::url::normalize_responses_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ResponsesClient {
    http: Client,
    config: ApiConfig,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<ApiStreamEvent>,
    pub terminal: Option<ResponseStatus>,
    pub usage: Option<UsageTotals>,
    /// Count of SSE frames the parser had to drop as undecodable.
    pub skipped_frames: usize,
}

impl ResponsesClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_responses_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ApiError> {
        let headers = build_headers(&self.config)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ApiError::InvalidBaseUrl(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ApiError::InvalidBaseUrl(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ResponsesRequest,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        validate_request_payload_shape(request)?;

        let headers = self.build_headers()?;
        let payload = request_with_transport_defaults(request);
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload))
    }

    pub async fn send_with_retry(
        &self,
        request: &ResponsesRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(ApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(ApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(ApiError::Status(status, message));
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < MAX_RETRIES {
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(ApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(ApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    pub async fn stream_with_handler<F>(
        &self,
        request: &ResponsesRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamOutcome, ApiError>
    where
        F: FnMut(ApiStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut outcome = StreamOutcome::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ApiError::Cancelled);
            }
            let chunk = chunk.map_err(ApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(event, &mut outcome, &mut on_event)?;
            }
        }

        if is_cancelled(cancellation) {
            return Err(ApiError::Cancelled);
        }

        outcome.skipped_frames = parser.skipped_frames();
        Ok(outcome)
    }

    pub async fn stream(
        &self,
        request: &ResponsesRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ApiError> {
        let mut events = Vec::new();
        let outcome = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult {
            events,
            terminal: outcome.terminal.flatten(),
            usage: outcome.usage,
            skipped_frames: outcome.skipped_frames,
        })
    }
}

/// Terminal bookkeeping collected while a stream is forwarded.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    /// Outer `Some` once a completed frame was seen; inner status may be
    /// absent when the frame carried an unknown status string.
    pub terminal: Option<Option<ResponseStatus>>,
    pub usage: Option<UsageTotals>,
    pub skipped_frames: usize,
}

impl StreamOutcome {
    pub fn terminal(&self) -> Option<ResponseStatus> {
        self.terminal.flatten()
    }
}

fn validate_request_payload_shape(request: &ResponsesRequest) -> Result<(), ApiError> {
    if request.input.is_array() {
        return Ok(());
    }

    Err(ApiError::InvalidRequestPayload(format!(
        "'input' must be a JSON array/list, got {}",
        value_type_name(&request.input)
    )))
}

fn request_with_transport_defaults(request: &ResponsesRequest) -> ResponsesRequest {
    let mut payload = request.clone();
    payload.store = false;
    payload.stream = true;
    if payload.tool_choice.is_none() {
        payload.tool_choice = Some("auto".to_owned());
    }
    payload
}

fn value_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn process_stream_event<F>(
    event: ApiStreamEvent,
    outcome: &mut StreamOutcome,
    on_event: &mut F,
) -> Result<(), ApiError>
where
    F: FnMut(ApiStreamEvent),
{
    if let Some(error) = stream_failure_from_event(&event) {
        return Err(error);
    }

    if let ApiStreamEvent::Completed { status, usage } = &event {
        outcome.terminal = Some(*status);
        if usage.is_some() {
            outcome.usage = *usage;
        }
    }

    on_event(event);
    Ok(())
}

fn stream_failure_from_event(event: &ApiStreamEvent) -> Option<ApiError> {
    match event {
        ApiStreamEvent::Failed { message } => Some(ApiError::StreamFailed {
            code: None,
            message: message
                .clone()
                .unwrap_or_else(|| "response failed".to_owned()),
        }),
        ApiStreamEvent::Error { code, message } => Some(ApiError::StreamFailed {
            code: code.clone(),
            message: message
                .clone()
                .or_else(|| code.clone())
                .unwrap_or_else(|| r#"{"type":"error"}"#.to_owned()),
        }),
        _ => None,
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
