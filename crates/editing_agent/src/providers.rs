//! Provider bootstrap from environment configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_provider::RunProvider;
use agent_provider_mock::{ScriptedProvider, MOCK_PROVIDER_ID};
use agent_provider_responses_api::{
    ResponsesApiProvider, ResponsesApiProviderConfig, RESPONSES_API_PROVIDER_ID,
};
use serde::Deserialize;

/// Selects the provider backend. Unset or blank falls back to the mock.
pub const PROVIDER_ENV_VAR: &str = "EDITING_AGENT_PROVIDER";

/// Points at the JSON config file required by the API-backed provider.
pub const API_CONFIG_PATH_ENV_VAR: &str = "EDITING_AGENT_API_CONFIG_PATH";

pub const DEFAULT_PROVIDER_ID: &str = MOCK_PROVIDER_ID;

/// On-disk provider config. Unknown fields are rejected so typos surface
/// at startup instead of silently using defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    api_key: String,
    models: Vec<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

pub fn provider_from_env() -> Result<Arc<dyn RunProvider>, String> {
    let provider_id = std::env::var(PROVIDER_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    provider_for_id(provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID))
}

pub fn provider_for_id(provider_id: &str) -> Result<Arc<dyn RunProvider>, String> {
    match provider_id {
        MOCK_PROVIDER_ID => Ok(Arc::new(ScriptedProvider::default())),
        RESPONSES_API_PROVIDER_ID => responses_api_provider_from_env(),
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}, {RESPONSES_API_PROVIDER_ID}"
        )),
    }
}

fn responses_api_provider_from_env() -> Result<Arc<dyn RunProvider>, String> {
    let config_path = std::env::var(API_CONFIG_PATH_ENV_VAR).map_err(|_| {
        format!(
            "The {RESPONSES_API_PROVIDER_ID} provider requires {API_CONFIG_PATH_ENV_VAR} \
             to point at a JSON config file"
        )
    })?;

    let config = load_api_config(Path::new(config_path.trim()))?;
    let provider = ResponsesApiProvider::new(config).map_err(|error| {
        format!("Failed to initialize the {RESPONSES_API_PROVIDER_ID} provider: {error}")
    })?;
    Ok(Arc::new(provider))
}

fn load_api_config(path: &Path) -> Result<ResponsesApiProviderConfig, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|error| format!("Failed to read provider config {}: {error}", path.display()))?;
    let file: ApiConfigFile = serde_json::from_str(&raw)
        .map_err(|error| format!("Failed to parse provider config {}: {error}", path.display()))?;

    if file.api_key.trim().is_empty() {
        return Err("Provider config `api_key` must be a non-empty string".to_string());
    }

    let models: Vec<String> = file
        .models
        .iter()
        .map(|model| model.trim().to_string())
        .filter(|model| !model.is_empty())
        .collect();
    if models.is_empty() {
        return Err("Provider config `models` must list at least one non-empty model ID".to_string());
    }

    if let Some(timeout_sec) = file.timeout_sec {
        if timeout_sec == 0 {
            return Err("Provider config `timeout_sec` must be greater than zero".to_string());
        }
    }

    let mut config = ResponsesApiProviderConfig::new(file.api_key, models);
    if let Some(base_url) = file.base_url {
        config = config.with_base_url(base_url);
    }
    if let Some(timeout_sec) = file.timeout_sec {
        config = config.with_timeout(Duration::from_secs(timeout_sec));
    }

    Ok(config)
}
