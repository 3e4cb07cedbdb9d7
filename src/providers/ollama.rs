//! Ollama adapter.
//!
//! Initialization checks `GET /api/tags` and only becomes ready when the
//! configured model has been pulled. Chat streams `POST /api/chat` as
//! newline-delimited JSON; a malformed line is logged and skipped.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{AdapterState, ChatProvider, build_http_client, ensure_streamable, join_url};
use crate::config::OllamaConfig;
use crate::error::{LlmError, classify_http_error, map_send_error, parse_error_envelope};
use crate::streaming::{DeltaStream, JsonLineConverter, StreamFactory};
use crate::types::{FinishReason, Message, ModelInfo, ProviderType, StreamDelta};

const PROVIDER: &str = "Ollama";

#[derive(Debug, Clone)]
struct ReadyClient {
    http: reqwest::Client,
}

#[derive(Debug)]
pub struct OllamaProvider {
    config: OllamaConfig,
    state: AdapterState<ReadyClient>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Self {
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

        let mut options = Map::new();
        options.insert("temperature".to_string(), json!(self.config.temperature));
        if let Some(max_tokens) = self.config.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }

        json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
            "options": options,
        })
    }

    /// List the models the server has pulled.
    async fn list_models(&self, http: &reqwest::Client) -> Result<Vec<String>, LlmError> {
        let response = http
            .get(join_url(&self.config.base_url, "api/tags"))
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(
                PROVIDER,
                &self.config.model,
                status.as_u16(),
                &body_text,
            ));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    async fn initialize(&mut self) -> Result<(), LlmError> {
        if self.state.is_ready() {
            return Ok(());
        }
        let http = build_http_client()?;
        let models = self.list_models(&http).await?;

        // Tags carry a `:latest`-style suffix, so match on containment.
        if !models.iter().any(|name| name.contains(&self.config.model)) {
            tracing::warn!(
                model = %self.config.model,
                available = ?models,
                "Ollama model not pulled; run `ollama pull {}`",
                self.config.model
            );
            return Err(LlmError::ModelNotFound {
                provider: PROVIDER.to_string(),
                model: self.config.model.clone(),
                message: format!("model not in /api/tags ({} available)", models.len()),
            });
        }

        self.state = AdapterState::Ready(ReadyClient { http });
        tracing::info!(model = %self.config.model, "Ollama service initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    async fn stream_chat(&self, history: &[Message]) -> Result<DeltaStream, LlmError> {
        let client = ensure_streamable(ProviderType::Ollama, &self.state, history)?;

        let request = client
            .http
            .post(join_url(&self.config.base_url, "api/chat"))
            .json(&self.build_request_body(history));

        let model = self.config.model.as_str();
        let response = StreamFactory::send(PROVIDER, request, |status, body| {
            classify_http_error(PROVIDER, model, status, body)
        })
        .await?;

        tracing::debug!(model = %model, messages = history.len(), "Ollama stream opened");
        Ok(StreamFactory::json_line_stream(
            response.bytes_stream(),
            OllamaLineConverter,
        ))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new(ProviderType::Ollama.display_name(), &self.config.model)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatLine {
    message: Option<OllamaLineMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaLineMessage {
    content: Option<String>,
}

/// Converts one `/api/chat` NDJSON line.
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaLineConverter;

impl JsonLineConverter for OllamaLineConverter {
    fn convert_line(&self, line: &str) -> Vec<Result<StreamDelta, LlmError>> {
        if let Some((message, error_code)) = parse_error_envelope(line) {
            return vec![Err(LlmError::ProviderError {
                provider: PROVIDER.to_string(),
                message,
                error_code,
            })];
        }

        let chunk: OllamaChatLine = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed Ollama line");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(2);
        if let Some(content) = chunk.message.and_then(|m| m.content)
            && !content.is_empty()
        {
            out.push(Ok(StreamDelta::token(content)));
        }
        if chunk.done {
            let reason = chunk
                .done_reason
                .as_deref()
                .map(FinishReason::from)
                .unwrap_or(FinishReason::Stop);
            out.push(Ok(StreamDelta::terminal(reason)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn content_line_becomes_token() {
        let out = OllamaLineConverter.convert_line(
            r#"{"model":"phi3","created_at":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":"Hi"},"done":false}"#,
        );
        assert!(matches!(out.as_slice(), [Ok(d)] if d.token == "Hi" && !d.done));
    }

    #[test]
    fn done_line_carries_reason() {
        let out = OllamaLineConverter.convert_line(
            r#"{"model":"phi3","message":{"role":"assistant","content":""},"done":true,"done_reason":"length","eval_count":12}"#,
        );
        let deltas: Vec<StreamDelta> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(deltas, vec![StreamDelta::terminal(FinishReason::Length)]);

        let out = OllamaLineConverter.convert_line(r#"{"done":true}"#);
        assert!(matches!(
            out.as_slice(),
            [Ok(StreamDelta { finish_reason: Some(FinishReason::Stop), .. })]
        ));
    }

    #[test]
    #[traced_test]
    fn error_line_fails_and_garbage_is_skipped() {
        let out = OllamaLineConverter.convert_line(r#"{"error":"model requires more system memory"}"#);
        assert!(matches!(out.as_slice(), [Err(LlmError::ProviderError { .. })]));

        assert!(OllamaLineConverter.convert_line("{\"message\":").is_empty());
        assert!(logs_contain("Skipping malformed Ollama line"));
    }

    #[test]
    fn num_predict_is_only_sent_when_configured() {
        let provider = OllamaProvider::new(OllamaConfig::default());
        let body = provider.build_request_body(&[Message::user("Hi")]);
        assert!(body["options"].get("num_predict").is_none());
        assert_eq!(body["stream"], true);

        let provider = OllamaProvider::new(OllamaConfig::default().with_max_tokens(128));
        let body = provider.build_request_body(&[Message::user("Hi")]);
        assert_eq!(body["options"]["num_predict"], 128);
    }
}
