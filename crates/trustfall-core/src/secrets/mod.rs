//! Secret providers: where opponents get their API keys from.
//!
//! [`SecretProvider`] is the narrow contract opponents depend on.
//! [`ConfigSecrets`] reads keys from the config file (optionally
//! vault-encrypted) or the environment, and [`CachedSecrets`] wraps any
//! provider with a freshness window and in-flight deduplication.

pub mod vault;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::SecretError;
use crate::singleflight::SingleFlight;
use vault::Vault;

/// Resolves a named credential to its secret value.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<String, SecretError>;
}

/// Environment variables that override the config file, per secret name.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("claude", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
];

/// Strip whitespace and one pair of surrounding quotes from a stored key.
pub fn clean_secret(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = [('"', '"'), ('\'', '\'')]
        .iter()
        .find_map(|(open, close)| {
            trimmed
                .strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

/// Render a key for logs without exposing it.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

// ── Config-backed provider ──────────────────────────────────────────

/// Secrets taken from `config.json` provider entries and the environment.
pub struct ConfigSecrets {
    values: HashMap<String, String>,
    vault: Option<Vault>,
}

impl ConfigSecrets {
    /// Collect keys from the config, letting environment variables win.
    pub fn from_config(config: &Config, vault: Option<Vault>) -> Self {
        let mut values = HashMap::new();
        for (secret, env_var) in ENV_OVERRIDES {
            let from_env = std::env::var(env_var)
                .ok()
                .filter(|v| !v.trim().is_empty());
            let from_config = config
                .providers
                .for_secret(secret)
                .map(|entry| entry.api_key.clone())
                .filter(|v| !v.trim().is_empty());

            if let Some(value) = from_env.or(from_config) {
                values.insert(secret.to_string(), value);
            }
        }
        Self { values, vault }
    }

    /// Build from explicit name/value pairs.
    pub fn from_values<I, K, V>(pairs: I, vault: Option<Vault>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            vault,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl SecretProvider for ConfigSecrets {
    async fn resolve(&self, name: &str) -> Result<String, SecretError> {
        let raw = self.values.get(name).ok_or_else(|| SecretError::NotFound {
            name: name.to_string(),
        })?;

        let plain = if vault::is_encrypted(raw) {
            let vault = self.vault.as_ref().ok_or_else(|| SecretError::Malformed {
                name: name.to_string(),
                reason: "value is vault-encrypted but no vault key is configured".into(),
            })?;
            vault.decrypt(raw).map_err(|e| SecretError::Unavailable {
                name: name.to_string(),
                reason: e.to_string(),
            })?
        } else {
            raw.clone()
        };

        let cleaned = clean_secret(&plain);
        if cleaned.is_empty() {
            return Err(SecretError::Malformed {
                name: name.to_string(),
                reason: "value is empty".into(),
            });
        }
        Ok(cleaned)
    }
}

// ── Caching wrapper ─────────────────────────────────────────────────

type Resolution = Result<String, SecretError>;

/// Caches successful resolutions for `ttl` and collapses concurrent
/// lookups of the same name into one call to the inner provider.
pub struct CachedSecrets<P> {
    inner: Arc<P>,
    ttl: Duration,
    cache: Mutex<HashMap<String, (String, Instant)>>,
    flights: Mutex<HashMap<String, Arc<SingleFlight<Resolution>>>>,
}

impl<P> CachedSecrets<P>
where
    P: SecretProvider + 'static,
{
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            ttl,
            cache: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Drop one cached secret.
    pub fn clear(&self, name: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Drop every cached secret.
    pub fn clear_all(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn cached(&self, name: &str) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(name)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    fn flight_for(&self, name: &str) -> Arc<SingleFlight<Resolution>> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(flights.entry(name.to_string()).or_default())
    }
}

#[async_trait]
impl<P> SecretProvider for CachedSecrets<P>
where
    P: SecretProvider + 'static,
{
    async fn resolve(&self, name: &str) -> Result<String, SecretError> {
        if let Some(value) = self.cached(name) {
            debug!(secret = name, "Secret served from cache");
            return Ok(value);
        }

        let inner = Arc::clone(&self.inner);
        let owned = name.to_string();
        let result = self
            .flight_for(name)
            .run(move || async move { inner.resolve(&owned).await })
            .await;

        match &result {
            Ok(value) => {
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), (value.clone(), Instant::now()));
            }
            Err(e) => warn!(secret = name, error = %e, "Secret resolution failed"),
        }
        result
    }
}
