//! AI orchestrator: routes every opponent request to the active backend.
//!
//! The orchestrator owns which [`ModelIdentity`] is active, persists that
//! choice, and tells both the registered backends and any listeners when it
//! changes. It implements [`Opponent`] itself, so callers never need to know
//! which vendor is answering.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::opponent::profile::StrategicProfile;
use crate::opponent::{LastError, ModelOpponent, Opponent};
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::openai::OpenAiProvider;
use crate::secrets::vault::Vault;
use crate::secrets::{CachedSecrets, ConfigSecrets, SecretProvider};
use crate::store::{KeyValueStore, MemoryStore, SELECTED_MODEL_KEY};
use crate::types::{ConversationMessage, Decision, GameStats, ModelIdentity, ScoreTally};

/// Called synchronously with the new identity after every switch.
type IdentityCallback = Arc<dyn Fn(ModelIdentity) + Send + Sync>;

type ListenerList = Arc<Mutex<Vec<(u64, IdentityCallback)>>>;

/// Handle returned by [`Orchestrator::subscribe`].
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Vec<(u64, IdentityCallback)>>>,
}

impl Subscription {
    /// Stop receiving identity changes.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

pub struct Orchestrator {
    default_identity: ModelIdentity,
    adapters: HashMap<ModelIdentity, Arc<dyn Opponent>>,
    active: Mutex<ModelIdentity>,
    store: Arc<dyn KeyValueStore>,
    listeners: ListenerList,
    next_listener: AtomicU64,
}

pub struct OrchestratorBuilder {
    default_identity: ModelIdentity,
    adapters: HashMap<ModelIdentity, Arc<dyn Opponent>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl OrchestratorBuilder {
    /// Register the backend that embodies `identity`.
    pub fn register(mut self, identity: ModelIdentity, adapter: Arc<dyn Opponent>) -> Self {
        self.adapters.insert(identity, adapter);
        self
    }

    /// Where the selected identity is persisted. Defaults to memory.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Restore the persisted selection and apply it.
    pub fn build(self) -> Orchestrator {
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let initial = match store.get(SELECTED_MODEL_KEY) {
            Some(saved) => match saved.parse::<ModelIdentity>() {
                Ok(identity) => {
                    info!(identity = %identity, "Restored selected opponent");
                    identity
                }
                Err(e) => {
                    warn!(error = %e, default = %self.default_identity, "Ignoring saved opponent");
                    self.default_identity
                }
            },
            None => {
                info!(default = %self.default_identity, "No saved opponent, using default");
                self.default_identity
            }
        };

        let orchestrator = Orchestrator {
            default_identity: self.default_identity,
            adapters: self.adapters,
            active: Mutex::new(initial),
            store,
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
        };
        orchestrator.set_active_identity(initial);
        orchestrator
    }
}

impl Orchestrator {
    /// Start building around the backend that always exists.
    pub fn builder(default_identity: ModelIdentity, default_adapter: Arc<dyn Opponent>) -> OrchestratorBuilder {
        let mut adapters = HashMap::new();
        adapters.insert(default_identity, default_adapter);
        OrchestratorBuilder {
            default_identity,
            adapters,
            store: None,
        }
    }

    /// Wire the Anthropic and OpenAI backends from configuration.
    ///
    /// Both share one HTTP client and one cached secret provider. A
    /// `defaultModel` without a backend falls back to Claude.
    pub fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;

        let vault_path = Config::vault_key_path();
        let vault = vault_path.exists().then(|| Vault::new(vault_path));
        let secrets: Arc<dyn SecretProvider> = Arc::new(CachedSecrets::new(
            ConfigSecrets::from_config(config, vault),
            Duration::from_secs(config.secrets.cache_ttl_seconds),
        ));

        let entry = |secret: &str| config.providers.for_secret(secret).cloned().unwrap_or_default();
        let game = &config.game;

        let anthropic = entry("claude");
        let claude: Arc<dyn Opponent> = Arc::new(
            ModelOpponent::new(
                Arc::new(AnthropicProvider::new(
                    anthropic.api_base.as_deref(),
                    anthropic.model.as_deref(),
                    client.clone(),
                )),
                Arc::clone(&secrets),
            )
            .with_max_tokens(game.max_tokens, game.profile_max_tokens),
        );

        let openai = entry("openai");
        let chatgpt: Arc<dyn Opponent> = Arc::new(
            ModelOpponent::new(
                Arc::new(OpenAiProvider::new(
                    openai.api_base.as_deref(),
                    openai.model.as_deref(),
                    client,
                )),
                Arc::clone(&secrets),
            )
            .with_max_tokens(game.max_tokens, game.profile_max_tokens),
        );

        let (default_identity, default_adapter) = match config.default_model {
            ModelIdentity::OpenAi => (ModelIdentity::OpenAi, Arc::clone(&chatgpt)),
            ModelIdentity::Claude => (ModelIdentity::Claude, Arc::clone(&claude)),
            other => {
                warn!(configured = %other, "No backend for configured default model, using claude");
                (ModelIdentity::Claude, Arc::clone(&claude))
            }
        };

        Ok(Self::builder(default_identity, default_adapter)
            .register(ModelIdentity::Claude, claude)
            .register(ModelIdentity::OpenAi, chatgpt)
            .store(store)
            .build())
    }

    pub fn default_identity(&self) -> ModelIdentity {
        self.default_identity
    }

    /// Identities with a dedicated backend.
    pub fn registered(&self) -> Vec<ModelIdentity> {
        ModelIdentity::ALL
            .into_iter()
            .filter(|id| self.adapters.contains_key(id))
            .collect()
    }

    /// Listen for identity changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ModelIdentity) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Backend for the active identity, or the default one.
    fn active_adapter(&self) -> &Arc<dyn Opponent> {
        let identity = self.active_identity();
        match self.adapters.get(&identity) {
            Some(adapter) => adapter,
            None => {
                warn!(identity = %identity, fallback = %self.default_identity, "No backend for identity, routing to default");
                &self.adapters[&self.default_identity]
            }
        }
    }
}

#[async_trait]
impl Opponent for Orchestrator {
    fn name(&self) -> &str {
        self.active_adapter().name()
    }

    async fn generate_strategic_profile(&self, tally: &ScoreTally, stats: &GameStats) -> StrategicProfile {
        self.active_adapter().generate_strategic_profile(tally, stats).await
    }

    async fn strategic_profile(&self, tally: &ScoreTally, stats: &GameStats) -> StrategicProfile {
        self.active_adapter().strategic_profile(tally, stats).await
    }

    async fn send_message(&self, history: &[ConversationMessage], tally: &ScoreTally, stats: &GameStats) -> String {
        self.active_adapter().send_message(history, tally, stats).await
    }

    async fn ai_decision(&self, history: &[ConversationMessage], tally: &ScoreTally, stats: &GameStats) -> Decision {
        self.active_adapter().ai_decision(history, tally, stats).await
    }

    /// Switch opponents: persist, propagate to every backend, then notify.
    fn set_active_identity(&self, identity: ModelIdentity) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = identity;

        if let Err(e) = self.store.set(SELECTED_MODEL_KEY, identity.as_str()) {
            warn!(identity = %identity, error = %e, "Failed to persist selected opponent");
        }

        for adapter in self.adapters.values() {
            adapter.set_active_identity(identity);
        }

        let listeners: Vec<IdentityCallback> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for listener in &listeners {
            listener(identity);
        }

        debug!(identity = %identity, listeners = listeners.len(), "Active opponent changed");
    }

    fn active_identity(&self) -> ModelIdentity {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_error(&self) -> Option<LastError> {
        self.active_adapter().last_error()
    }
}
