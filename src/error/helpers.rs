//! Upstream failure classification.
//!
//! Adapters first try their provider-specific envelope, then fall back to
//! [`classify_http_error`], which only looks at the status code.

use super::types::LlmError;
use serde_json::Value;

const BODY_SAMPLE_CHARS: usize = 200;

/// Truncate an upstream body for inclusion in log-only error detail.
pub fn body_sample(body_text: &str) -> String {
    body_text.chars().take(BODY_SAMPLE_CHARS).collect()
}

/// Pull `error.message` and `error.code`/`error.status` out of a JSON error envelope.
///
/// Handles `{"error": {"message": ..., "code": ...}}` (OpenAI, Gemini) and
/// `{"error": "..."}` (Ollama).
pub fn parse_error_envelope(body_text: &str) -> Option<(String, Option<String>)> {
    let json: Value = serde_json::from_str(body_text).ok()?;
    let error = json.get("error")?;

    if let Some(msg) = error.as_str() {
        return Some((msg.to_string(), None));
    }

    let message = error
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error")
        .to_string();
    let code = ["code", "status", "type"].iter().find_map(|key| match error.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });
    Some((message, code))
}

/// Classify an HTTP failure by status code alone.
pub fn classify_http_error(provider: &str, model: &str, status: u16, body_text: &str) -> LlmError {
    let envelope = parse_error_envelope(body_text);
    let message = match &envelope {
        Some((msg, _)) => format!("http={status} {msg}"),
        None => format!("http={status} body_sample={}", body_sample(body_text)),
    };

    match status {
        401 | 403 => LlmError::AuthenticationError {
            provider: provider.to_string(),
            message,
        },
        404 => LlmError::ModelNotFound {
            provider: provider.to_string(),
            model: model.to_string(),
            message,
        },
        429 => LlmError::RateLimitError {
            provider: provider.to_string(),
            message,
        },
        500..=599 => LlmError::ServiceUnavailable {
            provider: provider.to_string(),
            message,
        },
        _ => LlmError::ProviderError {
            provider: provider.to_string(),
            message,
            error_code: envelope.and_then(|(_, code)| code),
        },
    }
}

/// Map a transport-level `reqwest` failure.
///
/// Connection and timeout failures mean the upstream could not be reached.
pub fn map_send_error(provider: &str, error: reqwest::Error) -> LlmError {
    if error.is_connect() || error.is_timeout() {
        return LlmError::ServiceUnavailable {
            provider: provider.to_string(),
            message: format!("request failed: {error}"),
        };
    }
    LlmError::HttpError(format!("{provider} request failed: {error}"))
}
