//! Anthropic Messages API provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::types::{ChatMessage, ChatRequest};
use super::LlmProvider;
use crate::error::ProviderError;

/// Default base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Default model.
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

/// Value of the `anthropic-version` header.
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_base: Option<&str>, model: Option<&str>, client: Client) -> Self {
        let base_url = api_base
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let model = model.unwrap_or(DEFAULT_MODEL).to_string();

        debug!(base_url = %base_url, model = %model, "Initialized Anthropic provider");

        Self {
            client,
            base_url,
            model,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

impl<'a> MessagesRequest<'a> {
    fn from_chat(model: &'a str, request: &'a ChatRequest) -> Self {
        Self {
            model,
            max_tokens: request.max_tokens,
            messages: &request.messages,
            system: (!request.system.is_empty()).then_some(request.system.as_str()),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn secret_name(&self) -> &str {
        "claude"
    }

    fn key_prefix(&self) -> &str {
        "sk-ant-"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        let body = MessagesRequest::from_chat(&self.model, request);

        debug!(model = %self.model, url = %url, msg_count = request.messages.len(), "Sending messages request");

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body);

        super::execute(self.name(), builder).await
    }
}
