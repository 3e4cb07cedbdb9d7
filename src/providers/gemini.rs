//! Google Gemini adapter.
//!
//! Streams `POST {base_url}/models/{model}:streamGenerateContent?alt=sse`.
//! Gemini names the assistant role `model`, and every SSE event carries a
//! full `GenerateContentResponse` whose first candidate holds the new text.

use async_trait::async_trait;
use eventsource_stream::Event;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AdapterState, ChatProvider, build_http_client, ensure_streamable, join_url};
use crate::config::GeminiConfig;
use crate::error::{LlmError, body_sample, classify_http_error};
use crate::streaming::{DeltaStream, SseEventConverter, StreamFactory};
use crate::types::{FinishReason, Message, ModelInfo, ProviderType, Role, StreamDelta};

const PROVIDER: &str = "Gemini";

#[derive(Debug, Clone)]
struct ReadyClient {
    http: reqwest::Client,
    api_key: SecretString,
}

#[derive(Debug)]
pub struct GeminiProvider {
    config: GeminiConfig,
    state: AdapterState<ReadyClient>,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            state: AdapterState::Uninitialized,
        }
    }

    fn stream_url(&self) -> String {
        join_url(
            &self.config.base_url,
            &format!(
                "models/{}:streamGenerateContent?alt=sse",
                urlencoding::encode(&self.config.model)
            ),
        )
    }

    /// Earlier turns keep their roles (assistant becomes `model`); the final
    /// message is always sent as the user turn being answered.
    fn build_request_body(&self, history: &[Message]) -> Value {
        let last = history.len().saturating_sub(1);
        let contents: Vec<Value> = history
            .iter()
            .enumerate()
            .map(|(i, msg)| {
                let role = if i == last { "user" } else { gemini_role(msg.role) };
                json!({ "role": role, "parts": [{ "text": msg.content }] })
            })
            .collect();

        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
            },
        })
    }
}

const fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn initialize(&mut self) -> Result<(), LlmError> {
        if self.state.is_ready() {
            return Ok(());
        }
        let api_key = self.config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigurationError("Gemini API key is required".to_string())
        })?;

        self.state = AdapterState::Ready(ReadyClient {
            http: build_http_client()?,
            api_key,
        });
        tracing::info!(model = %self.config.model, "Gemini service initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    async fn stream_chat(&self, history: &[Message]) -> Result<DeltaStream, LlmError> {
        let client = ensure_streamable(ProviderType::Gemini, &self.state, history)?;

        let request = client
            .http
            .post(self.stream_url())
            .header("x-goog-api-key", client.api_key.expose_secret())
            .json(&self.build_request_body(history));

        let model = self.config.model.as_str();
        let response = StreamFactory::send(PROVIDER, request, |status, body| {
            classify_gemini_error(model, status, body)
        })
        .await?;

        tracing::debug!(model = %model, messages = history.len(), "Gemini stream opened");
        Ok(StreamFactory::sse_stream(
            response.bytes_stream(),
            GeminiEventConverter::new(model),
        ))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new(ProviderType::Gemini.display_name(), &self.config.model)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Gemini
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

impl GeminiErrorBody {
    fn has_reason(&self, reason: &str) -> bool {
        self.details
            .iter()
            .any(|d| d.get("reason").and_then(Value::as_str) == Some(reason))
    }
}

/// Classify a failed Gemini response by its `error.status`.
///
/// Gemini reports an invalid key as `400 INVALID_ARGUMENT` with an
/// `API_KEY_INVALID` reason, so status codes alone are not enough.
pub(crate) fn classify_gemini_error(model: &str, status: u16, body_text: &str) -> LlmError {
    let Ok(envelope) = serde_json::from_str::<GeminiErrorEnvelope>(body_text) else {
        return classify_http_error(PROVIDER, model, status, body_text);
    };
    let body = envelope.error;
    let message = format!(
        "http={status} status={} {}",
        body.status.as_deref().unwrap_or("-"),
        body_sample(&body.message)
    );

    if body.has_reason("API_KEY_INVALID") {
        return LlmError::AuthenticationError {
            provider: PROVIDER.to_string(),
            message,
        };
    }

    match body.status.as_deref() {
        Some("UNAUTHENTICATED" | "PERMISSION_DENIED") => LlmError::AuthenticationError {
            provider: PROVIDER.to_string(),
            message,
        },
        Some("RESOURCE_EXHAUSTED") => LlmError::RateLimitError {
            provider: PROVIDER.to_string(),
            message,
        },
        Some("NOT_FOUND") => LlmError::ModelNotFound {
            provider: PROVIDER.to_string(),
            model: model.to_string(),
            message,
        },
        Some("UNAVAILABLE" | "INTERNAL" | "DEADLINE_EXCEEDED") => LlmError::ServiceUnavailable {
            provider: PROVIDER.to_string(),
            message,
        },
        _ => classify_http_error(PROVIDER, model, status, body_text),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => {
            FinishReason::ContentFilter
        }
        other => FinishReason::Other(other.to_lowercase()),
    }
}

/// Gemini event converter
#[derive(Debug, Clone, Default)]
pub struct GeminiEventConverter {
    model: String,
}

impl GeminiEventConverter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl SseEventConverter for GeminiEventConverter {
    fn convert_event(&self, event: &Event) -> Vec<Result<StreamDelta, LlmError>> {
        if serde_json::from_str::<GeminiErrorEnvelope>(&event.data).is_ok() {
            return vec![Err(classify_gemini_error(&self.model, 200, &event.data))];
        }

        let response: GeminiStreamResponse = match serde_json::from_str(&event.data) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed Gemini chunk");
                return Vec::new();
            }
        };

        // A blocked prompt arrives as a response with no candidates.
        if response.candidates.is_empty() {
            return match response.prompt_feedback.and_then(|f| f.block_reason) {
                Some(_) => vec![Ok(StreamDelta::terminal(FinishReason::ContentFilter))],
                None => Vec::new(),
            };
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Vec::new();
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(2);
        if !text.is_empty() {
            out.push(Ok(StreamDelta::token(text)));
        }
        if let Some(reason) = candidate.finish_reason {
            out.push(Ok(StreamDelta::terminal(map_finish_reason(&reason))));
        }
        out
    }
}
