//! OpenAI Chat Completions provider.
//!
//! Works with OpenAI itself and any endpoint exposing the same
//! `/chat/completions` contract (including a same-origin proxy).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::types::{ChatRequest, Role};
use super::LlmProvider;
use crate::error::ProviderError;

/// Default base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `api_base` - Custom base URL (None = the public OpenAI API)
    /// * `model` - Model to use (None = [`DEFAULT_MODEL`])
    /// * `client` - Shared HTTP client
    pub fn new(api_base: Option<&str>, model: Option<&str>, client: Client) -> Self {
        let base_url = api_base
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let model = model.unwrap_or(DEFAULT_MODEL).to_string();

        debug!(base_url = %base_url, model = %model, "Initialized OpenAI provider");

        Self {
            client,
            base_url,
            model,
        }
    }
}

// ── OpenAI API request types ────────────────────────────────────────

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
}

impl<'a> CompletionRequest<'a> {
    /// The system prompt rides as the leading `system` message, if any.
    fn from_chat(model: &'a str, request: &'a ChatRequest) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        }));

        Self {
            model,
            messages,
            max_tokens: request.max_tokens,
        }
    }
}

// ── LlmProvider implementation ──────────────────────────────────────

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn secret_name(&self) -> &str {
        "openai"
    }

    fn key_prefix(&self) -> &str {
        "sk-"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest::from_chat(&self.model, request);

        debug!(model = %self.model, url = %url, msg_count = body.messages.len(), "Sending chat completion request");

        let builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        super::execute(self.name(), builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::ChatMessage;

    #[test]
    fn test_default_and_custom_base_url() {
        let p = OpenAiProvider::new(None, None, Client::new());
        assert_eq!(p.base_url, "https://api.openai.com/v1");
        assert_eq!(p.model(), "gpt-4o");

        let p = OpenAiProvider::new(Some("http://localhost:3000/api/openai/"), Some("gpt-4o-mini"), Client::new());
        assert_eq!(p.base_url, "http://localhost:3000/api/openai");
        assert_eq!(p.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_system_prompt_leads_messages() {
        let request = ChatRequest {
            system: "rules".into(),
            messages: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            max_tokens: 1024,
        };
        let body = serde_json::to_value(CompletionRequest::from_chat("gpt-4o", &request)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 1024,
                "messages": [
                    {"role": "system", "content": "rules"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"}
                ]
            })
        );
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let request = ChatRequest {
            system: String::new(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 500,
        };
        let body = serde_json::to_value(CompletionRequest::from_chat("gpt-4o", &request)).unwrap();
        assert_eq!(body["messages"], serde_json::json!([{"role": "user", "content": "hi"}]));
    }
}
