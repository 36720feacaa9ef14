//! System-instruction assembly for model round-trips.

use serde_json::Value;

/// Overrides the base policy block when set to a non-blank value.
pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "EDITING_AGENT_SYSTEM_INSTRUCTIONS";

pub const DEFAULT_BASE_INSTRUCTIONS: &str = "You are a careful JSON document editing assistant. \
Propose every document change through the generate_json_patch tool and wait for the user to \
approve it; never claim a change has been applied. Use analyze_json_structure to inspect the \
document before sweeping edits. Keep patch sets minimal and targeted. When no change is needed, \
answer in plain text.";

/// Base policy block followed by the current document, rebuilt for every
/// round-trip so mid-turn approvals are visible to the model.
#[must_use]
pub fn system_instructions(document: &Value) -> String {
    let document_json =
        serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
    format!(
        "{}\n\nCurrent document:\n```json\n{document_json}\n```\n",
        base_instructions()
    )
}

fn base_instructions() -> String {
    sanitize_base_instructions(std::env::var(SYSTEM_INSTRUCTIONS_ENV_VAR).ok())
}

fn sanitize_base_instructions(raw: Option<String>) -> String {
    let Some(value) = raw else {
        return DEFAULT_BASE_INSTRUCTIONS.to_string();
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        DEFAULT_BASE_INSTRUCTIONS.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, previous }
        }

        fn unset(key: &'static str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.take() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn default_instructions_embed_the_document() {
        let _lock = env_lock();
        let _guard = EnvVarGuard::unset(SYSTEM_INSTRUCTIONS_ENV_VAR);

        let instructions = system_instructions(&json!({"title": "Landing"}));

        assert!(instructions.starts_with(DEFAULT_BASE_INSTRUCTIONS));
        assert!(instructions.contains("Current document:"));
        assert!(instructions.contains("```json"));
        assert!(instructions.contains("\"title\": \"Landing\""));
    }

    #[test]
    fn env_override_replaces_base_instructions() {
        let _lock = env_lock();
        let _guard = EnvVarGuard::set(SYSTEM_INSTRUCTIONS_ENV_VAR, "  Only suggest, never apply.  ");

        let instructions = system_instructions(&json!({}));

        assert!(instructions.starts_with("Only suggest, never apply."));
        assert!(!instructions.contains(DEFAULT_BASE_INSTRUCTIONS));
    }

    #[test]
    fn blank_override_falls_back_to_default() {
        let _lock = env_lock();
        let _guard = EnvVarGuard::set(SYSTEM_INSTRUCTIONS_ENV_VAR, "   ");

        let instructions = system_instructions(&json!({}));

        assert!(instructions.starts_with(DEFAULT_BASE_INSTRUCTIONS));
    }

    #[test]
    fn sanitize_trims_override_text() {
        assert_eq!(
            sanitize_base_instructions(Some("  trimmed  ".to_string())),
            "trimmed"
        );
        assert_eq!(
            sanitize_base_instructions(None),
            DEFAULT_BASE_INSTRUCTIONS
        );
    }
}
