// Client construction from per-user credentials
//
// Every conversation talks to the endpoint its owner configured, so clients are
// built at runtime from (api key, base url) instead of once at startup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::openai::{OpenAIClient, OPENAI_API_BASE};
use crate::traits::ChatClient;

/// Configuration for an OpenAI-compatible provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    /// Base URL for the API (optional, defaults to https://api.openai.com/v1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = (!base_url.is_empty()).then_some(base_url);
        self
    }

    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(OPENAI_API_BASE)
    }
}

/// Factory for creating chat clients from provider configuration
pub trait ClientFactory: Send + Sync {
    fn create_chat_client(&self, config: &OpenAIConfig) -> Result<Arc<dyn ChatClient>>;
}

/// Default factory producing [`OpenAIClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIClientFactory;

impl ClientFactory for OpenAIClientFactory {
    fn create_chat_client(&self, config: &OpenAIConfig) -> Result<Arc<dyn ChatClient>> {
        let client = OpenAIClient::with_base_url(config.api_key.clone(), config.effective_base_url())?;
        Ok(Arc::new(client))
    }
}
