//! Provider adapters
//!
//! Each adapter wraps one upstream chat API behind [`ChatProvider`]:
//!
//! - [`openai::OpenAiProvider`]: `/chat/completions` with SSE chunks
//! - [`gemini::GeminiProvider`]: `:streamGenerateContent?alt=sse`
//! - [`ollama::OllamaProvider`]: `/api/chat` with newline-delimited JSON
//!
//! Adapters start [`AdapterState::Uninitialized`] and become ready through
//! [`ChatProvider::initialize`]; a ready adapter owns the HTTP client and
//! resolved settings it streams with.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::streaming::DeltaStream;
use crate::types::{Message, ModelInfo, ProviderType};

pub mod gemini;
pub mod ollama;
pub mod openai;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Uniform streaming chat contract implemented by every backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Establish readiness. Calling this on a ready adapter is a no-op.
    async fn initialize(&mut self) -> Result<(), LlmError>;

    fn is_initialized(&self) -> bool;

    /// Start streaming a reply to `history`.
    ///
    /// Fails before producing any delta when `history` is empty, when the
    /// adapter is not ready, or when the upstream rejects the request.
    async fn stream_chat(&self, history: &[Message]) -> Result<DeltaStream, LlmError>;

    fn model_info(&self) -> ModelInfo;

    fn provider_type(&self) -> ProviderType;
}

/// Readiness of a single adapter.
#[derive(Debug, Clone)]
pub enum AdapterState<T> {
    Uninitialized,
    Ready(T),
}

impl<T> Default for AdapterState<T> {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl<T> AdapterState<T> {
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(inner) => Some(inner),
            Self::Uninitialized => None,
        }
    }
}

/// Checks shared by every adapter before any network work.
pub(crate) fn ensure_streamable<'a, T>(
    provider: ProviderType,
    state: &'a AdapterState<T>,
    history: &[Message],
) -> Result<&'a T, LlmError> {
    if history.is_empty() {
        return Err(LlmError::InvalidInput(
            "Conversation history is required".to_string(),
        ));
    }
    state
        .ready()
        .ok_or_else(|| LlmError::ProviderNotInitialized(provider.display_name().to_string()))
}

/// Build the shared HTTP client used by a ready adapter.
pub(crate) fn build_http_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .user_agent(concat!("showmyai/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LlmError::ConfigurationError(format!("Failed to build HTTP client: {e}")))
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_rejected_before_readiness() {
        let state: AdapterState<()> = AdapterState::Uninitialized;
        let err = ensure_streamable(ProviderType::OpenAi, &state, &[]).unwrap_err();
        assert!(matches!(err, LlmError::InvalidInput(_)));

        let history = vec![Message::user("hi")];
        let err = ensure_streamable(ProviderType::OpenAi, &state, &history).unwrap_err();
        assert!(matches!(err, LlmError::ProviderNotInitialized(_)));

        let ready = AdapterState::Ready(7);
        assert_eq!(ensure_streamable(ProviderType::OpenAi, &ready, &history).ok(), Some(&7));
    }

    #[test]
    fn urls_are_joined_once() {
        assert_eq!(
            join_url("http://localhost:11434/", "/api/chat"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(join_url("https://x/v1", "chat/completions"), "https://x/v1/chat/completions");
    }
}
