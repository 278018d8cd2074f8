//! Wire types shared by every vendor provider.
//!
//! Requests are built from a vendor-neutral [`ChatRequest`]; responses are
//! normalized from whichever envelope the upstream (or a proxy in front of
//! it) sent back.

use serde::{Deserialize, Serialize};

/// Conversational role. System instructions travel separately in
/// [`ChatRequest::system`], never as a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Vendor-neutral chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

// ── Response normalization ──────────────────────────────────────────

/// The response envelopes we know how to read.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ResponseEnvelope {
    /// Anthropic Messages: a list of typed content blocks.
    Blocks { content: Vec<ContentBlock> },
    /// OpenAI Chat Completions: a list of choices.
    Choices { choices: Vec<Choice> },
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ResponseEnvelope {
    /// The assistant text, or `None` if the envelope carries none.
    pub(crate) fn into_text(self) -> Option<String> {
        match self {
            Self::Blocks { content } => {
                let text: String = content
                    .into_iter()
                    .filter(|b| b.block_type == "text")
                    .filter_map(|b| b.text)
                    .collect();
                let has_text = !text.is_empty();
                has_text.then_some(text)
            }
            Self::Choices { choices } => choices.into_iter().next().and_then(|c| c.message.content),
        }
    }
}

/// Parse a successful response body into assistant text.
pub(crate) fn extract_text(body: &str) -> Result<String, String> {
    let envelope: ResponseEnvelope =
        serde_json::from_str(body).map_err(|e| format!("unrecognized response envelope: {}", e))?;
    envelope
        .into_text()
        .ok_or_else(|| "response contained no text".to_string())
}

// ── Error normalization ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    /// Vendor shape: `{"error": {"message": ...}}`.
    Vendor { error: ErrorDetail },
    /// Proxy shape: `{"error": ..., "details": ...}` or `{"error": ..., "message": ...}`.
    Proxy {
        error: String,
        #[serde(default)]
        details: Option<serde_json::Value>,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Best human-readable message from an error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope::Vendor { error }) => error.message,
        Ok(ErrorEnvelope::Proxy {
            error,
            details,
            message,
        }) => {
            let nested = details
                .as_ref()
                .and_then(|d| d.pointer("/error/message"))
                .and_then(|m| m.as_str())
                .map(String::from);
            match nested.or(message) {
                Some(detail) => format!("{}: {}", error, detail),
                None => error,
            }
        }
        Err(_) => body.trim().to_string(),
    }
}
