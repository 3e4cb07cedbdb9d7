//! Retry decorator for chat providers.
//!
//! Only stream establishment is retried. An attempt counts as established
//! once the upstream has produced its first delta; anything that fails after
//! that reaches the caller as an error item on the stream it already holds.

use async_trait::async_trait;
use futures::stream;
use futures_util::StreamExt;

use super::policy::{RetryExecutor, RetryPolicy};
use crate::error::LlmError;
use crate::providers::ChatProvider;
use crate::streaming::DeltaStream;
use crate::types::{Message, ModelInfo, ProviderType};

/// Wraps a provider with bounded exponential-backoff retry.
pub struct RetryingProvider<P> {
    inner: P,
    executor: RetryExecutor,
}

impl<P: ChatProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        let label = inner.provider_type().as_str();
        Self {
            inner,
            executor: RetryExecutor::new(policy).with_label(label),
        }
    }

    /// Pick [`RetryPolicy::local`] or [`RetryPolicy::remote`] by provider type.
    pub fn with_default_policy(inner: P) -> Self {
        let policy = if inner.provider_type().is_local() {
            RetryPolicy::local()
        } else {
            RetryPolicy::remote()
        };
        Self::new(inner, policy)
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }
}

/// Open a stream and wait for its first item.
///
/// A first-item error is returned as the attempt's failure so the executor
/// can retry it; otherwise the item is put back in front of the stream.
async fn establish<P: ChatProvider>(
    provider: &P,
    history: &[Message],
) -> Result<DeltaStream, LlmError> {
    let mut deltas = provider.stream_chat(history).await?;
    match deltas.next().await {
        Some(Ok(first)) => Ok(Box::pin(stream::iter([Ok(first)]).chain(deltas))),
        Some(Err(error)) => Err(error),
        None => Ok(deltas),
    }
}

#[async_trait]
impl<P: ChatProvider> ChatProvider for RetryingProvider<P> {
    async fn initialize(&mut self) -> Result<(), LlmError> {
        self.inner.initialize().await
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    async fn stream_chat(&self, history: &[Message]) -> Result<DeltaStream, LlmError> {
        if history.is_empty() {
            return Err(LlmError::InvalidInput(
                "Conversation history is required".to_string(),
            ));
        }
        let inner = &self.inner;
        self.executor
            .execute(move || establish(inner, history))
            .await
    }

    fn model_info(&self) -> ModelInfo {
        self.inner.model_info()
    }

    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }
}
