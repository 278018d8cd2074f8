//! Configuration module for trustfall.
//!
//! Loads typed configuration from `~/.trustfall/config.json`.
//! All fields use `serde` defaults, so a partial file is always valid JSON
//! input and a missing file yields the stock configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::types::ModelIdentity;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub providers: ProvidersConfig,
    pub game: GameConfig,
    pub secrets: SecretsConfig,
    pub default_model: ModelIdentity,
}

impl Config {
    /// Load configuration from the default path (`~/.trustfall/config.json`).
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Get the default config directory path.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trustfall")
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Where the selected opponent and other small client state live.
    pub fn state_path() -> PathBuf {
        Self::config_dir().join("state.json")
    }

    /// Key file for `vault:`-encrypted secrets.
    pub fn vault_key_path() -> PathBuf {
        Self::config_dir().join("vault.key")
    }

    /// Check the configuration for values the game cannot run with.
    ///
    /// Missing API keys are not errors: opponents degrade to fallback replies.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let threshold = &self.game.decision_threshold;
        if threshold.min == 0 {
            errors.push("game.decisionThreshold.min must be at least 1".to_string());
        }
        if threshold.min > threshold.max {
            errors.push(format!(
                "game.decisionThreshold.min ({}) is greater than max ({})",
                threshold.min, threshold.max
            ));
        }
        if self.game.max_tokens == 0 {
            errors.push("game.maxTokens must be positive".to_string());
        }
        if self.game.profile_max_tokens == 0 {
            errors.push("game.profileMaxTokens must be positive".to_string());
        }
        for (name, entry) in self.providers.entries() {
            if let Some(base) = entry.api_base.as_deref() {
                if !(base.starts_with("http://") || base.starts_with("https://")) {
                    errors.push(format!(
                        "providers.{}.apiBase must be an http(s) URL, got '{}'",
                        name, base
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Write the default config template to disk.
    pub fn write_default_template() -> anyhow::Result<PathBuf> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = serde_json::json!({
            "providers": {
                "anthropic": {
                    "apiKey": "sk-ant-YOUR_KEY_HERE"
                },
                "openai": {
                    "apiKey": "sk-YOUR_KEY_HERE"
                }
            },
            "defaultModel": "claude",
            "game": {
                "decisionThreshold": { "min": 3, "max": 7 },
                "simulateThinking": true
            }
        });

        std::fs::write(&path, serde_json::to_string_pretty(&template)?)?;
        Ok(path)
    }
}

// ── Provider Configuration ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderEntry {
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic: Option<ProviderEntry>,
    pub openai: Option<ProviderEntry>,
}

impl ProvidersConfig {
    /// All configured entries, keyed by provider name.
    pub fn entries(&self) -> Vec<(&'static str, &ProviderEntry)> {
        let candidates = [("anthropic", &self.anthropic), ("openai", &self.openai)];
        candidates
            .into_iter()
            .filter_map(|(name, entry)| entry.as_ref().map(|e| (name, e)))
            .collect()
    }

    /// The entry backing a secret name (`claude` or `openai`).
    pub fn for_secret(&self, secret_name: &str) -> Option<&ProviderEntry> {
        match secret_name {
            "claude" => self.anthropic.as_ref(),
            "openai" => self.openai.as_ref(),
            _ => None,
        }
    }
}

// ── Game Configuration ──────────────────────────────────────────────

/// Inclusive range the per-round decision threshold is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThresholdRange {
    pub min: u32,
    pub max: u32,
}

impl Default for ThresholdRange {
    fn default() -> Self {
        Self { min: 3, max: 7 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    /// Human messages after which the opponent decides on its own.
    pub decision_threshold: ThresholdRange,
    /// Wait a random "thinking" delay before showing each reply.
    pub simulate_thinking: bool,
    pub initial_human_score: u64,
    pub initial_ai_score: u64,
    /// Output token cap for replies and decisions.
    pub max_tokens: u32,
    /// Output token cap for strategic profile generation.
    pub profile_max_tokens: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            decision_threshold: ThresholdRange::default(),
            simulate_thinking: true,
            initial_human_score: 1_245_678,
            initial_ai_score: 1_203_456,
            max_tokens: 1024,
            profile_max_tokens: 500,
        }
    }
}

// ── Secrets Configuration ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretsConfig {
    /// How long a resolved secret is reused before it is fetched again.
    pub cache_ttl_seconds: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_model, ModelIdentity::Claude);
        assert_eq!(config.game.decision_threshold, ThresholdRange { min: 3, max: 7 });
        assert_eq!(config.game.max_tokens, 1024);
        assert_eq!(config.secrets.cache_ttl_seconds, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_minimal_json() {
        let json = r#"{"providers": {"anthropic": {"apiKey": "sk-ant-test"}}, "defaultModel": "openai"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let entry = config.providers.anthropic.unwrap();
        assert_eq!(entry.api_key, "sk-ant-test");
        assert!(config.providers.openai.is_none());
        assert_eq!(config.default_model, ModelIdentity::OpenAi);
        assert!(config.game.simulate_thinking);
    }

    #[test]
    fn test_for_secret_maps_vendor_entries() {
        let json = r#"{"providers": {"openai": {"apiKey": "sk-xyz", "model": "gpt-4o-mini"}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.providers.for_secret("openai").unwrap().api_key, "sk-xyz");
        assert!(config.providers.for_secret("claude").is_none());
        assert!(config.providers.for_secret("gemini").is_none());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let json = r#"{
            "game": {"decisionThreshold": {"min": 8, "max": 2}, "maxTokens": 0},
            "providers": {"openai": {"apiKey": "k", "apiBase": "localhost:8080"}}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("greater than max")));
        assert!(errors.iter().any(|e| e.contains("maxTokens")));
        assert!(errors.iter().any(|e| e.contains("apiBase")));
    }
}
