//! Chat relay: one client turn from session resolution to commit.
//!
//! [`ChatRelay::send`] validates the request and resolves the session up
//! front, then returns a [`RelayStream`] that yields:
//!
//! 1. a [`RelayEvent::Session`] frame naming the resolved session
//! 2. every delta from the active provider, as it arrives
//! 3. nothing further after the terminal delta, or a single
//!    [`RelayEvent::Error`] frame if the upstream fails
//!
//! The assistant reply is appended to the session just before the terminal
//! delta is yielded. A failed or abandoned stream commits nothing.

use std::borrow::Cow;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use futures_util::StreamExt;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use validator::{Validate, ValidationError};

use crate::error::LlmError;
use crate::selector::ProviderSelector;
use crate::session::SessionStore;
use crate::types::{Role, StreamDelta};

/// Longest accepted message, in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Body of a send-message request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_message"))]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_session_id"))]
    pub session_id: Option<String>,
}

fn validate_message(message: &str) -> Result<(), ValidationError> {
    if message.trim().is_empty() {
        return Err(ValidationError::new("required").with_message(Cow::Borrowed("Message is required")));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        let mut error = ValidationError::new("length")
            .with_message(Cow::Borrowed("Message must be less than 500 characters"));
        error.add_param(Cow::Borrowed("max"), &MAX_MESSAGE_CHARS);
        return Err(error);
    }
    Ok(())
}

fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    uuid::Uuid::parse_str(session_id)
        .map(|_| ())
        .map_err(|_| ValidationError::new("uuid").with_message(Cow::Borrowed("Invalid session ID format")))
}

impl SendMessageRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Trim the message the same way it is validated and stored.
    pub fn normalized(mut self) -> Self {
        let trimmed = self.message.trim();
        if trimmed.len() != self.message.len() {
            self.message = trimmed.to_string();
        }
        self
    }
}

/// One frame of a relay stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// `{"type":"session","sessionId":...}`
    Session { session_id: String },
    /// `{"token":...,"done":...,"finishReason"?:...}`
    Delta(StreamDelta),
    /// `{"type":"error","error":...}`, with a client-safe message
    Error { error: String },
}

impl Serialize for RelayEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Session { session_id } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "session")?;
                map.serialize_entry("sessionId", session_id)?;
                map.end()
            }
            Self::Delta(delta) => delta.serialize(serializer),
            Self::Error { error } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "error")?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

impl RelayEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","error":"An error occurred while processing your request"}"#
                .to_string()
        })
    }

    pub const fn is_terminal(&self) -> bool {
        match self {
            Self::Session { .. } => false,
            Self::Delta(delta) => delta.done,
            Self::Error { .. } => true,
        }
    }
}

/// Frames for one client turn. Dropping it cancels the upstream request.
pub type RelayStream = Pin<Box<dyn Stream<Item = RelayEvent> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    Streaming,
    Completed,
    Failed,
}

/// Orchestrates chat turns against a session store and provider selector.
#[derive(Debug, Clone)]
pub struct ChatRelay {
    sessions: Arc<SessionStore>,
    selector: Arc<ProviderSelector>,
}

impl ChatRelay {
    pub fn new(sessions: Arc<SessionStore>, selector: Arc<ProviderSelector>) -> Self {
        Self { sessions, selector }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn selector(&self) -> &Arc<ProviderSelector> {
        &self.selector
    }

    /// A relay routing to another provider over the same sessions.
    pub fn with_selector(&self, selector: ProviderSelector) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            selector: Arc::new(selector),
        }
    }

    /// Reuse the session if it is live, otherwise start a new one.
    async fn resolve_session(&self, requested: Option<&str>) -> String {
        if let Some(id) = requested {
            if self.sessions.get(id).await.is_some() {
                return id.to_string();
            }
            tracing::debug!(session_id = %id, "Requested session not found, starting a new one");
        }
        self.sessions.create().await
    }

    /// Run one chat turn.
    ///
    /// Validation and provider readiness are checked before any session is
    /// created or modified; those failures are returned directly. Upstream
    /// failures arrive as a [`RelayEvent::Error`] frame on the stream.
    pub async fn send(&self, request: SendMessageRequest) -> Result<RelayStream, LlmError> {
        let request = request.normalized();
        request.validate()?;

        if !self.selector.is_initialized() {
            return Err(LlmError::ProviderNotInitialized(
                self.selector.model_info().provider,
            ));
        }

        let session_id = self.resolve_session(request.session_id.as_deref()).await;
        let session = self
            .sessions
            .append(&session_id, Role::User, request.message)
            .await?;
        let history = session.conversation_history;

        tracing::info!(
            session_id = %session_id,
            provider = %self.selector.active(),
            history_len = history.len(),
            "Relaying chat message"
        );

        let sessions = Arc::clone(&self.sessions);
        let selector = Arc::clone(&self.selector);

        Ok(Box::pin(async_stream::stream! {
            yield RelayEvent::Session { session_id: session_id.clone() };

            let mut phase = RelayPhase::Streaming;
            let mut reply = String::new();

            match selector.stream_chat(&history).await {
                Ok(mut deltas) => {
                    while let Some(item) = deltas.next().await {
                        match item {
                            Ok(delta) if delta.is_terminal() => {
                                reply.push_str(&delta.token);
                                if let Err(error) = sessions.append(&session_id, Role::Assistant, std::mem::take(&mut reply)).await {
                                    tracing::warn!(session_id = %session_id, error = %error, "Session ended before reply was stored");
                                }
                                phase = RelayPhase::Completed;
                                yield RelayEvent::Delta(delta);
                                break;
                            }
                            Ok(delta) => {
                                reply.push_str(&delta.token);
                                yield RelayEvent::Delta(delta);
                            }
                            Err(error) => {
                                tracing::error!(session_id = %session_id, error = %error, category = ?error.category(), "Streaming error");
                                phase = RelayPhase::Failed;
                                yield RelayEvent::Error { error: error.user_message() };
                                break;
                            }
                        }
                    }

                    if phase == RelayPhase::Streaming {
                        tracing::error!(session_id = %session_id, "Upstream stream ended without a terminal delta");
                        phase = RelayPhase::Failed;
                        yield RelayEvent::Error { error: "Failed to get AI response".to_string() };
                    }
                }
                Err(error) => {
                    tracing::error!(session_id = %session_id, error = %error, category = ?error.category(), "Failed to start AI stream");
                    phase = RelayPhase::Failed;
                    yield RelayEvent::Error { error: error.user_message() };
                }
            }

            tracing::debug!(session_id = %session_id, phase = ?phase, "Chat turn finished");
        }))
    }
}
