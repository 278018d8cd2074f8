//! Error taxonomy shared by the secret, provider and game layers.
//!
//! None of these ever escape the orchestrator contract: opponents absorb
//! them into fallback values and record them as their last error.

use thiserror::Error;

/// Failure to obtain a credential from a secret provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("secret '{name}' not found")]
    NotFound { name: String },

    #[error("secret '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },

    #[error("failed to fetch secret '{name}': {reason}")]
    Unavailable { name: String, reason: String },
}

/// Failure of a single upstream chat-completion call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API key unavailable: {0}")]
    Secret(#[from] SecretError),

    #[error("LLM API error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("network error calling LLM API: {0}")]
    Transport(String),

    #[error("malformed LLM API response: {0}")]
    MalformedResponse(String),
}

/// Coarse classification used to pick a user-facing failure reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bad or missing credentials.
    Unauthorized,
    RateLimited,
    Generic,
    Network,
}

impl ProviderError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Secret(_) => FailureClass::Unauthorized,
            Self::Http { status: 401 | 403, .. } => FailureClass::Unauthorized,
            Self::Http { status: 429, .. } => FailureClass::RateLimited,
            Self::Http { .. } | Self::MalformedResponse(_) => FailureClass::Generic,
            Self::Transport(_) => FailureClass::Network,
        }
    }

    /// HTTP status, if the upstream produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Misuse of the game session API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("the round is over; start a new one")]
    RoundOver,

    #[error("you have already made your decision this round")]
    AlreadyDecided,
}
