//! Domain types shared across the opponent, orchestrator and game layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which vendor backend currently embodies the opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelIdentity {
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl ModelIdentity {
    pub const ALL: [ModelIdentity; 3] = [Self::Claude, Self::OpenAi, Self::Gemini];

    /// Stable identifier used in config, persisted state and secret names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Sender name shown in the transcript.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "CLAUDE",
            Self::OpenAi => "CHATGPT",
            Self::Gemini => "GEMINI",
        }
    }

    /// How the opponent introduces itself.
    pub fn greeting(&self) -> &'static str {
        match self {
            Self::Claude => "Hello! I'm Claude.",
            Self::OpenAi => "Hello! I'm ChatGPT.",
            Self::Gemini => "Hello! I'm Gemini.",
        }
    }
}

impl Default for ModelIdentity {
    fn default() -> Self {
        Self::Claude
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "openai" | "chatgpt" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown model '{}'", other)),
        }
    }
}

/// A participant's binding choice for the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Share,
    Keep,
}

impl Decision {
    /// Uniform coin flip, used whenever the opponent cannot decide for itself.
    pub fn random<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Self::Share
        } else {
            Self::Keep
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Share => "SHARE",
            Self::Keep => "KEEP",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who wrote a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    /// Narrative text from the game itself. Never sent to a backend.
    System,
    /// The human player.
    You,
    /// The opponent, under its display name.
    Opponent(String),
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("SYSTEM"),
            Self::You => f.write_str("YOU"),
            Self::Opponent(name) => f.write_str(name),
        }
    }
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Sender::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Sender::You, content)
    }

    pub fn opponent(name: &str, content: impl Into<String>) -> Self {
        Self::new(Sender::Opponent(name.to_string()), content)
    }
}

/// A player's historical outcome counts, fed to the opponent as context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub username: String,
    pub games_played: u32,
    pub both_share: u32,
    pub human_share_ai_keep: u32,
    pub human_keep_ai_share: u32,
    pub both_keep: u32,
}

/// Global human-vs-AI running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTally {
    pub human: u64,
    pub ai: u64,
}

impl ScoreTally {
    pub fn new(human: u64, ai: u64) -> Self {
        Self { human, ai }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_parse_and_names() {
        assert_eq!("claude".parse::<ModelIdentity>(), Ok(ModelIdentity::Claude));
        assert_eq!(" OpenAI ".parse::<ModelIdentity>(), Ok(ModelIdentity::OpenAi));
        assert_eq!("gemini".parse::<ModelIdentity>(), Ok(ModelIdentity::Gemini));
        assert!("llama".parse::<ModelIdentity>().is_err());

        assert_eq!(ModelIdentity::OpenAi.display_name(), "CHATGPT");
        assert_eq!(ModelIdentity::OpenAi.to_string(), "openai");
    }

    #[test]
    fn test_identity_serde_matches_as_str() {
        for id in ModelIdentity::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
        }
    }

    #[test]
    fn test_random_decision_covers_both() {
        let mut rng = rand::thread_rng();
        let draws: Vec<Decision> = (0..200).map(|_| Decision::random(&mut rng)).collect();
        assert!(draws.contains(&Decision::Share));
        assert!(draws.contains(&Decision::Keep));
    }

    #[test]
    fn test_sender_display() {
        assert_eq!(Sender::System.to_string(), "SYSTEM");
        assert_eq!(Sender::You.to_string(), "YOU");
        assert_eq!(Sender::Opponent("CLAUDE".into()).to_string(), "CLAUDE");
    }
}
