//! Transport-only streaming client primitives for an OpenAI-style
//! responses endpoint.
//!
//! This crate owns request building, retry policy, and SSE decoding for the
//! streaming transport only. It intentionally contains no auth/login code
//! and no knowledge of conversations, tools, or documents.
//!
//! SSE normalization surfaces function-tool calls as a
//! started/arguments/completed event triplet
//! ([`ApiStreamEvent::ToolCallCompleted`] carries the fully accumulated
//! argument string); undecodable frames are dropped and counted rather than
//! failing the stream.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::ResponsesClient;
pub use client::StreamResult;
pub use config::ApiConfig;
pub use error::ApiError;
pub use events::{ApiStreamEvent, ResponseStatus, UsageTotals};
pub use payload::ResponsesRequest;
pub use sse::SseStreamParser;
pub use url::normalize_responses_url;
