//! Core data types shared across the relay.

pub mod chat;
pub mod provider;
pub mod session;
pub mod stream;

pub use chat::{Message, Role};
pub use provider::{ModelInfo, ProviderType};
pub use session::{Session, SessionSummary};
pub use stream::{FinishReason, StreamDelta};
