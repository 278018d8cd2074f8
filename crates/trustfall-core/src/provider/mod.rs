//! LLM provider trait and vendor implementations.
//!
//! A provider knows one vendor's wire format: where to POST, which headers
//! carry the key, how the request body is laid out. Everything above the
//! wire (caching, fallbacks, decision parsing) lives in [`crate::opponent`].

pub mod anthropic;
pub mod openai;
pub mod types;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use tracing::debug;

use crate::error::ProviderError;
use types::ChatRequest;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Name the API key is resolved under.
    fn secret_name(&self) -> &str;

    /// Prefix a well-formed key is expected to start with.
    fn key_prefix(&self) -> &str;

    /// Model identifier sent upstream.
    fn model(&self) -> &str;

    /// Perform one chat completion and return the assistant text.
    async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<String, ProviderError>;
}

/// Send a prepared request and normalize the outcome.
///
/// Shared by all vendors: transport failures, non-2xx statuses and
/// unreadable bodies map onto the [`ProviderError`] taxonomy.
pub(crate) async fn execute(provider: &str, request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Transport(format!("failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message: types::error_message(&body),
        });
    }

    let text = types::extract_text(&body).map_err(ProviderError::MalformedResponse)?;
    debug!(provider, chars = text.len(), "Received LLM response");
    Ok(text)
}
