//! OpenAI chat-completions adapter.
//!
//! Streams `POST {base_url}/chat/completions` with `stream: true`. Each SSE
//! event carries a `chat.completion.chunk`; the terminal chunk is the one
//! with a non-null `finish_reason`, followed by a literal `[DONE]`.

use async_trait::async_trait;
use eventsource_stream::Event;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AdapterState, ChatProvider, build_http_client, ensure_streamable, join_url};
use crate::config::OpenAiConfig;
use crate::error::{LlmError, classify_http_error, parse_error_envelope};
use crate::streaming::{DeltaStream, SseEventConverter, StreamFactory};
use crate::types::{FinishReason, Message, ModelInfo, ProviderType, StreamDelta};

const PROVIDER: &str = "OpenAI";

#[derive(Debug, Clone)]
struct ReadyClient {
    http: reqwest::Client,
    api_key: SecretString,
}

/// Adapter for the OpenAI chat-completions API (and compatible endpoints).
#[derive(Debug)]
pub struct OpenAiProvider {
    config: OpenAiConfig,
    state: AdapterState<ReadyClient>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            state: AdapterState::Uninitialized,
        }
    }

    fn build_request_body(&self, history: &[Message]) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .map(|msg| json!({ "role": msg.role.as_str(), "content": msg.content }))
            .collect();

        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": true,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn initialize(&mut self) -> Result<(), LlmError> {
        if self.state.is_ready() {
            return Ok(());
        }
        let api_key = self.config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigurationError("OpenAI API key is required".to_string())
        })?;

        self.state = AdapterState::Ready(ReadyClient {
            http: build_http_client()?,
            api_key,
        });
        tracing::info!(model = %self.config.model, "OpenAI service initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    async fn stream_chat(&self, history: &[Message]) -> Result<DeltaStream, LlmError> {
        let client = ensure_streamable(ProviderType::OpenAi, &self.state, history)?;

        let request = client
            .http
            .post(join_url(&self.config.base_url, "chat/completions"))
            .bearer_auth(client.api_key.expose_secret())
            .json(&self.build_request_body(history));

        let model = self.config.model.as_str();
        let response = StreamFactory::send(PROVIDER, request, |status, body| {
            classify_openai_error(model, status, body)
        })
        .await?;

        tracing::debug!(model = %model, messages = history.len(), "OpenAI stream opened");
        Ok(StreamFactory::sse_stream(
            response.bytes_stream(),
            OpenAiEventConverter::new(model),
        ))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new(ProviderType::OpenAi.display_name(), &self.config.model)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAi
    }
}

/// Refine a failed response using OpenAI's `error.code`.
///
/// 401/429/5xx are already unambiguous by status; the code matters for keys
/// rejected with 403 and for missing models reported with 400/404.
pub(crate) fn classify_openai_error(model: &str, status: u16, body_text: &str) -> LlmError {
    let envelope = parse_error_envelope(body_text);
    let code = envelope.as_ref().and_then(|(_, code)| code.as_deref());

    match code {
        Some("invalid_api_key") => LlmError::AuthenticationError {
            provider: PROVIDER.to_string(),
            message: format!("http={status} invalid_api_key"),
        },
        Some("insufficient_quota" | "rate_limit_exceeded") => LlmError::RateLimitError {
            provider: PROVIDER.to_string(),
            message: format!("http={status} {}", code.unwrap_or_default()),
        },
        Some("model_not_found") => LlmError::ModelNotFound {
            provider: PROVIDER.to_string(),
            model: model.to_string(),
            message: format!("http={status} model_not_found"),
        },
        _ => classify_http_error(PROVIDER, model, status, body_text),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    delta: Option<OpenAiDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

/// OpenAI event converter
#[derive(Debug, Clone, Default)]
pub struct OpenAiEventConverter {
    model: String,
}

impl OpenAiEventConverter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl SseEventConverter for OpenAiEventConverter {
    fn convert_event(&self, event: &Event) -> Vec<Result<StreamDelta, LlmError>> {
        // In-band errors arrive on an already accepted (200) stream.
        if parse_error_envelope(&event.data).is_some() {
            return vec![Err(classify_openai_error(&self.model, 200, &event.data))];
        }

        let chunk: OpenAiChunk = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OpenAI chunk");
                return Vec::new();
            }
        };

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(2);
        if let Some(content) = choice.delta.and_then(|d| d.content)
            && !content.is_empty()
        {
            out.push(Ok(StreamDelta::token(content)));
        }
        if let Some(reason) = choice.finish_reason {
            out.push(Ok(StreamDelta::terminal(FinishReason::from(reason.as_str()))));
        }
        out
    }
}
