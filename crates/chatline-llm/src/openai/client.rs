// OpenAI-compatible client implementation

use crate::streaming::parse_chat_sse_stream;
use crate::traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, EventStream, TokenUsage};
use crate::types::Message;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible client (HTTP direct, no SDK)
///
/// Works against any endpoint that speaks the `chat/completions` protocol, which is
/// why the base URL is part of the client rather than a constant.
pub struct OpenAIClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    /// Create new client with API key against the public OpenAI endpoint
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, OPENAI_API_BASE)
    }

    /// Create new client with API key against a custom endpoint
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.into();
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build chat completion request payload
    fn build_chat_request(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
    ) -> Value {
        let mut obj = Map::new();
        obj.insert("model".to_string(), serde_json::json!(model));
        obj.insert("messages".to_string(), serde_json::json!(messages));
        obj.insert("stream".to_string(), serde_json::json!(stream));

        if let Some(temp) = options.temperature {
            obj.insert("temperature".to_string(), serde_json::json!(temp));
        }
        if let Some(max_tokens) = options.max_tokens {
            obj.insert("max_tokens".to_string(), serde_json::json!(max_tokens));
        }

        Value::Object(obj)
    }

    async fn post_completion(&self, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(status = %status, base_url = %self.base_url, "chat completion request rejected");
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat API error ({}): {}", status, error_text);
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAIClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let payload = self.build_chat_request(
            &request.model,
            &request.messages,
            &request.options,
            false,
        );

        let raw: OpenAIChatResponse = self
            .post_completion(&payload)
            .await?
            .json()
            .await
            .context("Failed to parse response")?;

        let choice = raw.choices.first();
        Ok(ChatResponse {
            content: choice.and_then(|c| c.message.content.clone()),
            usage: raw.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.and_then(|c| c.finish_reason.clone()),
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let payload = self.build_chat_request(
            &request.model,
            &request.messages,
            &request.options,
            true,
        );

        let response = self.post_completion(&payload).await?;
        Ok(parse_chat_sse_stream(response))
    }
}

// ============================================================================
// CHAT COMPLETIONS RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAIClient::with_base_url("sk-test", "http://localhost:8080/v1/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_build_chat_request_payload() {
        let client = OpenAIClient::new("sk-test").unwrap();
        let messages = vec![Message::system("be brief"), Message::human("hi")];
        let options = ChatOptions::new().temperature(0.2);

        let payload = client.build_chat_request("deepseek-chat", &messages, &options, true);

        assert_eq!(payload["model"], "deepseek-chat");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "hi");
        assert!(payload.get("max_tokens").is_none());
    }
}
