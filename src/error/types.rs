use serde::Serialize;
use thiserror::Error;

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Coarse grouping of errors, used for logging and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any session or stream work began
    Validation,
    /// Session lookup failures
    Session,
    /// Local provider wiring (selection, initialization)
    Provider,
    /// Failures reported by, or on the way to, an upstream model API
    Upstream,
    /// Configuration and internal faults
    Internal,
}

/// Classification of an upstream failure, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Auth,
    RateLimited,
    ModelUnavailable,
    ServiceUnavailable,
    Unknown,
}

/// Errors produced by the relay and its provider adapters.
///
/// Upstream variants keep the raw upstream detail in `message` for logs;
/// [`LlmError::user_message`] never includes it.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Caller supplied unusable input (e.g. empty history)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request field validation failed
    #[error("Validation failed: {}", format_violations(.0))]
    ValidationError(Vec<FieldViolation>),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("{0} service not initialized")]
    ProviderNotInitialized(String),

    #[error("Invalid AI provider: {0}")]
    InvalidProvider(String),

    #[error("{provider} authentication failed: {message}")]
    AuthenticationError { provider: String, message: String },

    #[error("{provider} rate limit exceeded: {message}")]
    RateLimitError { provider: String, message: String },

    #[error("{provider} model \"{model}\" not available: {message}")]
    ModelNotFound {
        provider: String,
        model: String,
        message: String,
    },

    #[error("{provider} service unavailable: {message}")]
    ServiceUnavailable { provider: String, message: String },

    /// Upstream failure that fits no other class
    #[error("{provider} API error: {message}")]
    ProviderError {
        provider: String,
        message: String,
        error_code: Option<String>,
    },

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl LlmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) | Self::ValidationError(_) => ErrorCategory::Validation,
            Self::SessionNotFound(_) => ErrorCategory::Session,
            Self::ProviderNotInitialized(_) | Self::InvalidProvider(_) => ErrorCategory::Provider,
            Self::AuthenticationError { .. }
            | Self::RateLimitError { .. }
            | Self::ModelNotFound { .. }
            | Self::ServiceUnavailable { .. }
            | Self::ProviderError { .. }
            | Self::HttpError(_)
            | Self::ParseError(_)
            | Self::StreamError(_) => ErrorCategory::Upstream,
            Self::ConfigurationError(_) | Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// The normalized upstream classification, or `None` for local errors.
    pub fn upstream_kind(&self) -> Option<UpstreamErrorKind> {
        match self {
            Self::AuthenticationError { .. } => Some(UpstreamErrorKind::Auth),
            Self::RateLimitError { .. } => Some(UpstreamErrorKind::RateLimited),
            Self::ModelNotFound { .. } => Some(UpstreamErrorKind::ModelUnavailable),
            Self::ServiceUnavailable { .. } => Some(UpstreamErrorKind::ServiceUnavailable),
            Self::ProviderError { .. }
            | Self::HttpError(_)
            | Self::ParseError(_)
            | Self::StreamError(_) => Some(UpstreamErrorKind::Unknown),
            _ => None,
        }
    }

    /// Whether the failure is transient in general. Retry policies may narrow this.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.upstream_kind(),
            Some(UpstreamErrorKind::RateLimited | UpstreamErrorKind::ServiceUnavailable)
        )
    }

    /// Short, client-safe description. Never contains upstream payloads or keys.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) => msg.clone(),
            Self::ValidationError(violations) => violations
                .first()
                .map(|v| v.message.clone())
                .unwrap_or_else(|| "Invalid request".to_string()),
            Self::SessionNotFound(_) => "Session not found".to_string(),
            Self::ProviderNotInitialized(_) => "AI service is not initialized".to_string(),
            Self::InvalidProvider(_) => {
                "Invalid AI provider. Must be one of: openai, gemini, ollama".to_string()
            }
            Self::AuthenticationError { provider, .. } => format!("Invalid {provider} API key"),
            Self::RateLimitError { provider, .. } => {
                format!("{provider} rate limit exceeded. Please try again later.")
            }
            Self::ModelNotFound {
                provider, model, ..
            } => format!("{provider} model \"{model}\" not found"),
            Self::ServiceUnavailable { provider, .. } => {
                format!("{provider} service temporarily unavailable")
            }
            Self::ProviderError { .. }
            | Self::HttpError(_)
            | Self::ParseError(_)
            | Self::StreamError(_) => "Failed to get AI response".to_string(),
            Self::ConfigurationError(_) | Self::InternalError(_) => {
                "An error occurred while processing your request".to_string()
            }
        }
    }

    /// HTTP status used when this error is returned instead of a stream.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::ValidationError(_) | Self::InvalidProvider(_) => 400,
            Self::SessionNotFound(_) => 404,
            Self::RateLimitError { .. } => 429,
            Self::ProviderNotInitialized(_) | Self::ServiceUnavailable { .. } => 503,
            Self::AuthenticationError { .. }
            | Self::ModelNotFound { .. }
            | Self::ProviderError { .. }
            | Self::HttpError(_)
            | Self::ParseError(_)
            | Self::StreamError(_) => 502,
            Self::ConfigurationError(_) | Self::InternalError(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_kinds_are_normalized() {
        let err = LlmError::RateLimitError {
            provider: "OpenAI".into(),
            message: "slow down".into(),
        };
        assert_eq!(err.upstream_kind(), Some(UpstreamErrorKind::RateLimited));
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert!(err.is_retryable());

        let err = LlmError::StreamError("socket closed".into());
        assert_eq!(err.upstream_kind(), Some(UpstreamErrorKind::Unknown));
        assert!(!err.is_retryable());

        assert_eq!(LlmError::SessionNotFound("x".into()).upstream_kind(), None);
    }

    #[test]
    fn user_message_hides_upstream_detail() {
        let err = LlmError::AuthenticationError {
            provider: "OpenAI".into(),
            message: "Incorrect API key provided: sk-abc***".into(),
        };
        let msg = err.user_message();
        assert_eq!(msg, "Invalid OpenAI API key");
        assert!(!msg.contains("sk-"));

        let err = LlmError::ProviderError {
            provider: "Gemini".into(),
            message: r#"{"error":{"message":"boom"}}"#.into(),
            error_code: Some("INTERNAL".into()),
        };
        assert_eq!(err.user_message(), "Failed to get AI response");
    }

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = LlmError::ValidationError(vec![FieldViolation {
            field: "message".into(),
            message: "Message must be less than 500 characters".into(),
        }]);
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.user_message(), "Message must be less than 500 characters");
        assert!(err.to_string().contains("message: Message must be"));
    }
}
