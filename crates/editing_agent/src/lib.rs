//! Approval-gated JSON document editing agent.
//!
//! The runtime drives a bounded tool-calling loop against a streaming
//! model provider. The model inspects the document and proposes patches;
//! every proposal lands in an approval queue and nothing touches the
//! document until the user approves it. Approved changes flow through
//! [`graft`]'s validate-then-apply gate and are undoable.
//!
//! ## Provider selection
//!
//! [`providers::provider_from_env`] picks the backend from
//! `EDITING_AGENT_PROVIDER`:
//!
//! - `mock` (default): the scripted in-process provider, no network.
//! - `responses-api`: a streaming HTTP backend configured by a JSON file
//!   at `EDITING_AGENT_API_CONFIG_PATH`:
//!
//! ```json
//! {
//!   "api_key": "sk-...",
//!   "models": ["gpt-4.1", "gpt-4.1-mini"],
//!   "base_url": "https://api.openai.com/v1",
//!   "timeout_sec": 120
//! }
//! ```
//!
//! `base_url` and `timeout_sec` are optional.
//!
//! ## System instructions
//!
//! Every round-trip sends a policy block plus the current document as
//! pretty JSON. Set `EDITING_AGENT_SYSTEM_INSTRUCTIONS` to replace the
//! policy block; blank values fall back to the default.
//!
//! ## Conversation memory
//!
//! Entries produced by an in-flight turn are buffered and committed to
//! the durable conversation only when the turn completes. Failed,
//! cancelled, and aborted turns keep the user's message but drop the
//! partial assistant output, so a retry replays a clean history.

pub mod events;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod runtime;
pub mod session;
pub mod tools;

pub use events::{DocumentChangeSource, SharedEvents, UiEvent};
pub use orchestrator::{AbortReason, LoopState, TurnOutcome, DEFAULT_MAX_STEPS};
pub use runtime::EditorRuntime;
pub use session::{Message, Mode, Role, Session, TurnId, UsageTotals};
pub use tools::{ToolContext, ToolHandler, ToolRegistry, ToolResultBody};

pub(crate) fn lock_unpoisoned<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
