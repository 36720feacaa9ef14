/// Default base URL for Responses API requests.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Normalize a base URL to a streaming responses endpoint.
///
/// Normalization rules:
/// 1) empty input falls back to the default base URL
/// 2) a missing scheme gets `https://` prepended
/// 3) keep a `/responses` suffix unchanged, append it otherwise
pub fn normalize_responses_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_API_BASE_URL
    } else {
        input.trim()
    };

    let base = if base.contains("://") {
        base.to_string()
    } else {
        format!("https://{base}")
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/responses") {
        return trimmed.to_string();
    }
    format!("{trimmed}/responses")
}
