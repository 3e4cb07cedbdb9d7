//! Active-provider routing.
//!
//! A [`ProviderSelector`] is an immutable value: the active provider is fixed
//! at construction, and [`ProviderSelector::set_provider`] returns a new
//! selector sharing the same adapters. Holders swap selectors explicitly
//! instead of mutating hidden shared state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::LlmError;
use crate::providers::{ChatProvider, GeminiProvider, OllamaProvider, OpenAiProvider};
use crate::retry::RetryingProvider;
use crate::streaming::DeltaStream;
use crate::types::{Message, ModelInfo, ProviderType};

type ProviderMap = HashMap<ProviderType, Box<dyn ChatProvider>>;

/// Routes chat streams to the active, retry-wrapped adapter.
#[derive(Clone)]
pub struct ProviderSelector {
    providers: Arc<ProviderMap>,
    active: ProviderType,
}

impl std::fmt::Debug for ProviderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<&str> = self.providers.keys().map(|p| p.as_str()).collect();
        registered.sort_unstable();
        f.debug_struct("ProviderSelector")
            .field("active", &self.active)
            .field("registered", &registered)
            .finish()
    }
}

impl ProviderSelector {
    /// Build a selector over already-initialized (or deliberately
    /// uninitialized) adapters.
    pub fn new(active: ProviderType, providers: Vec<Box<dyn ChatProvider>>) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.provider_type(), p))
            .collect();
        Self {
            providers: Arc::new(providers),
            active,
        }
    }

    /// Build and initialize every adapter from configuration.
    ///
    /// An adapter that fails to initialize is still registered; it reports
    /// not-initialized until the process restarts. Only the active provider's
    /// failure is logged at `warn`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, LlmError> {
        let mut adapters: Vec<Box<dyn ChatProvider>> = vec![
            Box::new(RetryingProvider::with_default_policy(OpenAiProvider::new(
                config.openai.clone(),
            ))),
            Box::new(RetryingProvider::with_default_policy(GeminiProvider::new(
                config.gemini.clone(),
            ))),
            Box::new(RetryingProvider::with_default_policy(OllamaProvider::new(
                config.ollama.clone(),
            ))),
        ];

        for adapter in &mut adapters {
            let provider = adapter.provider_type();
            if let Err(error) = adapter.initialize().await {
                if provider == config.active_provider {
                    tracing::warn!(provider = %provider, error = %error, "Active AI provider failed to initialize");
                } else {
                    tracing::debug!(provider = %provider, error = %error, "AI provider not initialized");
                }
            }
        }

        Ok(Self::new(config.active_provider, adapters))
    }

    pub const fn active(&self) -> ProviderType {
        self.active
    }

    /// Return a selector routing to `name`, sharing this selector's adapters.
    pub fn set_provider(&self, name: &str) -> Result<Self, LlmError> {
        let active: ProviderType = name.parse()?;
        if !self.providers.contains_key(&active) {
            return Err(LlmError::InvalidProvider(name.to_string()));
        }
        Ok(Self {
            providers: Arc::clone(&self.providers),
            active,
        })
    }

    fn active_provider(&self) -> Option<&dyn ChatProvider> {
        self.providers.get(&self.active).map(|p| p.as_ref())
    }

    pub fn is_initialized(&self) -> bool {
        self.active_provider().is_some_and(|p| p.is_initialized())
    }

    pub fn model_info(&self) -> ModelInfo {
        self.active_provider()
            .map(|p| p.model_info())
            .unwrap_or_else(|| ModelInfo::new("Unknown", "Unknown"))
    }

    /// Stream from the active provider.
    pub async fn stream_chat(&self, history: &[Message]) -> Result<DeltaStream, LlmError> {
        let provider = self
            .active_provider()
            .ok_or_else(|| LlmError::InvalidProvider(self.active.to_string()))?;
        if !provider.is_initialized() {
            return Err(LlmError::ProviderNotInitialized(
                self.active.display_name().to_string(),
            ));
        }
        provider.stream_chat(history).await
    }
}

static_assertions::assert_impl_all!(ProviderSelector: Send, Sync, Clone);
