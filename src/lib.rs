//! # ShowMyAI - Session-aware chat relay
//!
//! ShowMyAI keeps short-lived conversation sessions in memory and relays each
//! chat turn to one of three interchangeable LLM backends (OpenAI, Google
//! Gemini, Ollama), re-emitting the backend's native stream as a uniform
//! sequence of [`StreamDelta`](types::StreamDelta) values.
//!
//! ## Architecture
//!
//! - **Provider adapters** (`providers`): translate the neutral transcript into
//!   each upstream request shape and decode the upstream stream (SSE or NDJSON).
//! - **Retry wrapper** (`retry`): bounded exponential backoff around stream
//!   establishment only; a stream that already produced tokens is never retried.
//! - **Provider selector** (`selector`): routes to the active backend.
//! - **Session store** (`session`): transcripts keyed by session id, swept on
//!   inactivity.
//! - **Chat relay** (`relay`): one request from session resolution to commit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use showmyai::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let selector = ProviderSelector::from_config(&config).await?;
//!     let sessions = Arc::new(SessionStore::new(config.session.timeout));
//!     let relay = ChatRelay::new(sessions, Arc::new(selector));
//!
//!     let mut events = relay.send(SendMessageRequest::new("Hello")).await?;
//!     while let Some(event) = events.next().await {
//!         println!("{}", event.to_json());
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod providers;
pub mod rate_limit;
pub mod relay;
pub mod retry;
pub mod selector;
pub mod session;
pub mod streaming;
pub mod telemetry;
pub mod types;

#[cfg(feature = "server-adapters")]
pub mod server;

pub use error::LlmError;

/// Commonly used items.
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::error::{ErrorCategory, LlmError, UpstreamErrorKind};
    pub use crate::providers::ChatProvider;
    pub use crate::relay::{ChatRelay, RelayEvent, RelayStream, SendMessageRequest};
    pub use crate::retry::{RetryPolicy, RetryingProvider};
    pub use crate::selector::ProviderSelector;
    pub use crate::session::SessionStore;
    pub use crate::streaming::DeltaStream;
    pub use crate::types::{FinishReason, Message, ModelInfo, ProviderType, Role, Session, StreamDelta};
}
