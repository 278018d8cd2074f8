//! The AI opponent: one uniform contract over every model backend.
//!
//! [`ModelOpponent`] wraps a vendor [`LlmProvider`] with everything above
//! the wire: lazy key loading, the cached strategic profile, prompt
//! construction, decision parsing and failure absorption. No method on
//! [`Opponent`] can fail; every error becomes a fallback value and is kept
//! as the opponent's last error.

pub mod decision;
pub mod profile;
pub mod prompt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::error::{FailureClass, ProviderError};
use crate::provider::types::{ChatMessage, ChatRequest};
use crate::provider::LlmProvider;
use crate::secrets::{mask_secret, SecretProvider};
use crate::singleflight::SingleFlight;
use crate::types::{ConversationMessage, Decision, GameStats, ModelIdentity, ScoreTally, Sender};
use decision::{parse_decision, DECISION_INSTRUCTION};
use profile::{parse_profile, StrategicProfile};

/// Default output budget for conversational and decision calls.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default output budget for profile generation.
pub const DEFAULT_PROFILE_MAX_TOKENS: u32 = 500;

/// The most recent upstream failure an opponent absorbed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastError {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Contract every opponent backend fulfils.
#[async_trait]
pub trait Opponent: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Elicit a fresh strategic profile. Falls back to the default profile.
    async fn generate_strategic_profile(&self, tally: &ScoreTally, stats: &GameStats) -> StrategicProfile;

    /// The cached profile, generating it on first use.
    async fn strategic_profile(&self, tally: &ScoreTally, stats: &GameStats) -> StrategicProfile;

    /// The opponent's next conversational reply.
    async fn send_message(&self, history: &[ConversationMessage], tally: &ScoreTally, stats: &GameStats) -> String;

    /// The opponent's binding SHARE/KEEP choice.
    async fn ai_decision(&self, history: &[ConversationMessage], tally: &ScoreTally, stats: &GameStats) -> Decision;

    /// Adopt a persona. Discards any cached or in-flight profile.
    fn set_active_identity(&self, identity: ModelIdentity);

    fn active_identity(&self) -> ModelIdentity;

    fn last_error(&self) -> Option<LastError>;
}

/// User-facing reply for a failed conversational call.
pub fn failure_reply(err: &ProviderError) -> String {
    match err.failure_class() {
        FailureClass::Unauthorized => "I'm having trouble connecting. The API key appears to be invalid. Please check your configuration.".to_string(),
        FailureClass::RateLimited => "I'm having trouble connecting. The API is rate limited. Please try again in a moment.".to_string(),
        FailureClass::Generic => {
            let detail = err
                .status()
                .map_or_else(|| "unexpected response".to_string(), |s| s.to_string());
            format!("I'm having trouble connecting. API error ({}). Please try again.", detail)
        }
        FailureClass::Network => "I'm having trouble connecting. There was a network error. Please check your internet connection and try again.".to_string(),
    }
}

/// Transcript → wire messages. SYSTEM entries are dropped; the human is the
/// `user`, anyone else speaks as the `assistant`.
pub fn to_chat_messages(history: &[ConversationMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|m| match m.sender {
            Sender::System => None,
            Sender::You => Some(ChatMessage::user(&m.content)),
            Sender::Opponent(_) => Some(ChatMessage::assistant(&m.content)),
        })
        .collect()
}

/// Cached profile, tagged with the generation it belongs to.
struct ProfileSlot {
    epoch: u64,
    profile: Option<StrategicProfile>,
}

struct Inner {
    provider: Arc<dyn LlmProvider>,
    secrets: Arc<dyn SecretProvider>,
    api_key: Mutex<Option<String>>,
    key_flight: SingleFlight<Result<String, ProviderError>>,
    profile: Mutex<ProfileSlot>,
    profile_flight: SingleFlight<StrategicProfile>,
    identity: Mutex<ModelIdentity>,
    last_error: Mutex<Option<LastError>>,
}

/// An [`Opponent`] backed by one vendor provider.
pub struct ModelOpponent {
    inner: Arc<Inner>,
    max_tokens: u32,
    profile_max_tokens: u32,
}

impl ModelOpponent {
    pub fn new(provider: Arc<dyn LlmProvider>, secrets: Arc<dyn SecretProvider>) -> Self {
        info!(provider = provider.name(), model = provider.model(), "Opponent backend ready");
        Self {
            inner: Arc::new(Inner {
                provider,
                secrets,
                api_key: Mutex::new(None),
                key_flight: SingleFlight::new(),
                profile: Mutex::new(ProfileSlot {
                    epoch: 0,
                    profile: None,
                }),
                profile_flight: SingleFlight::new(),
                identity: Mutex::new(ModelIdentity::default()),
                last_error: Mutex::new(None),
            }),
            max_tokens: DEFAULT_MAX_TOKENS,
            profile_max_tokens: DEFAULT_PROFILE_MAX_TOKENS,
        }
    }

    /// Override the output budgets.
    pub fn with_max_tokens(mut self, max_tokens: u32, profile_max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self.profile_max_tokens = profile_max_tokens;
        self
    }

    async fn chat_request(&self, system: String, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let request = ChatRequest {
            system,
            messages,
            max_tokens: self.max_tokens,
        };
        self.inner.call(&request).await
    }
}

impl Inner {
    /// The API key, loaded once and kept. Concurrent loads share one lookup.
    async fn api_key(self: &Arc<Self>) -> Result<String, ProviderError> {
        let loaded = self.api_key.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(key) = loaded {
            return Ok(key);
        }

        let inner = Arc::clone(self);
        self.key_flight
            .run(move || async move { inner.load_key().await })
            .await
    }

    async fn load_key(&self) -> Result<String, ProviderError> {
        let provider = self.provider.name();
        let key = self.secrets.resolve(self.provider.secret_name()).await?;

        if !key.starts_with(self.provider.key_prefix()) {
            warn!(provider, expected = self.provider.key_prefix(), "API key has an unexpected prefix");
        }
        info!(provider, key = %mask_secret(&key), "API key loaded");

        *self.api_key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        Ok(key)
    }

    async fn call(self: &Arc<Self>, request: &ChatRequest) -> Result<String, ProviderError> {
        let key = self.api_key().await?;
        self.provider.chat(&key, request).await
    }

    fn record_error(&self, err: &ProviderError) {
        error!(provider = self.provider.name(), error = %err, "LLM call failed");
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(LastError {
            message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn cached_profile(&self) -> Option<StrategicProfile> {
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .profile
            .clone()
    }

    fn profile_epoch(&self) -> u64 {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner).epoch
    }

    /// One elicitation call. The result is cached only if it was parsed from
    /// a real reply and no identity switch happened since `epoch`.
    async fn fetch_profile(self: Arc<Self>, epoch: u64, request: ChatRequest) -> StrategicProfile {
        let provider = self.provider.name();
        debug!(provider, "Generating strategic profile");

        match self.call(&request).await {
            Ok(text) => {
                let profile = parse_profile(&text);
                let mut slot = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.epoch == epoch {
                    slot.profile = Some(profile.clone());
                    info!(provider, "Strategic profile generated");
                } else {
                    debug!(provider, "Discarding profile from a previous identity");
                }
                profile
            }
            Err(e) => {
                self.record_error(&e);
                warn!(provider, "Using default strategic profile");
                StrategicProfile::default()
            }
        }
    }
}

#[async_trait]
impl Opponent for ModelOpponent {
    fn name(&self) -> &str {
        self.inner.provider.name()
    }

    async fn generate_strategic_profile(&self, tally: &ScoreTally, stats: &GameStats) -> StrategicProfile {
        let epoch = self.inner.profile_epoch();
        let request = ChatRequest {
            system: prompt::PROFILE_SYSTEM.to_string(),
            messages: vec![ChatMessage::user(&prompt::build_profile_prompt(tally, stats))],
            max_tokens: self.profile_max_tokens,
        };

        let inner = Arc::clone(&self.inner);
        self.inner
            .profile_flight
            .run(move || inner.fetch_profile(epoch, request))
            .await
    }

    async fn strategic_profile(&self, tally: &ScoreTally, stats: &GameStats) -> StrategicProfile {
        match self.inner.cached_profile() {
            Some(profile) => profile,
            None => self.generate_strategic_profile(tally, stats).await,
        }
    }

    async fn send_message(&self, history: &[ConversationMessage], tally: &ScoreTally, stats: &GameStats) -> String {
        let profile = self.strategic_profile(tally, stats).await;
        let system = prompt::build_system_prompt(&profile, tally, stats);

        match self.chat_request(system, to_chat_messages(history)).await {
            Ok(text) => text,
            Err(e) => {
                self.inner.record_error(&e);
                failure_reply(&e)
            }
        }
    }

    async fn ai_decision(&self, history: &[ConversationMessage], tally: &ScoreTally, stats: &GameStats) -> Decision {
        let profile = self.strategic_profile(tally, stats).await;
        let system = prompt::build_system_prompt(&profile, tally, stats);
        let mut messages = to_chat_messages(history);
        messages.push(ChatMessage::user(DECISION_INSTRUCTION));

        let parsed = match self.chat_request(system, messages).await {
            Ok(text) => {
                let parsed = parse_decision(&text);
                if parsed.is_none() {
                    warn!(provider = self.name(), reply = %text, "Could not parse decision");
                }
                parsed
            }
            Err(e) => {
                self.inner.record_error(&e);
                None
            }
        };

        parsed.unwrap_or_else(|| {
            let decision = Decision::random(&mut rand::thread_rng());
            warn!(provider = self.name(), decision = %decision, "Falling back to a random decision");
            decision
        })
    }

    fn set_active_identity(&self, identity: ModelIdentity) {
        *self.inner.identity.lock().unwrap_or_else(PoisonError::into_inner) = identity;

        let mut slot = self.inner.profile.lock().unwrap_or_else(PoisonError::into_inner);
        slot.epoch += 1;
        slot.profile = None;
        drop(slot);
        self.inner.profile_flight.reset();

        debug!(provider = self.name(), identity = %identity, "Identity set, profile invalidated");
    }

    fn active_identity(&self) -> ModelIdentity {
        *self.inner.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_error(&self) -> Option<LastError> {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecretError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays canned results and records every request it sees.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        fallback: Result<String, ProviderError>,
        requests: Mutex<Vec<ChatRequest>>,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn always(result: Result<String, ProviderError>) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: result,
                requests: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        fn then(self, result: Result<String, ProviderError>) -> Self {
            self.replies.lock().unwrap().push_back(result);
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn secret_name(&self) -> &str {
            "claude"
        }

        fn key_prefix(&self) -> &str {
            "sk-ant-"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn chat(&self, _api_key: &str, request: &ChatRequest) -> Result<String, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    struct StaticSecrets {
        key: Option<&'static str>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl SecretProvider for StaticSecrets {
        async fn resolve(&self, name: &str) -> Result<String, SecretError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.key.map(String::from).ok_or_else(|| SecretError::NotFound {
                name: name.to_string(),
            })
        }
    }

    fn secrets(key: Option<&'static str>) -> Arc<StaticSecrets> {
        Arc::new(StaticSecrets {
            key,
            lookups: AtomicUsize::new(0),
        })
    }

    fn opponent(provider: &Arc<ScriptedProvider>, secrets: &Arc<StaticSecrets>) -> ModelOpponent {
        ModelOpponent::new(provider.clone(), secrets.clone())
    }

    fn ctx() -> (ScoreTally, GameStats) {
        (ScoreTally::new(100, 90), GameStats::default())
    }

    fn transcript() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::system("Welcome to TRUSTFALL."),
            ConversationMessage::opponent("CLAUDE", "Hello! I'm Claude."),
            ConversationMessage::human("Shall we both share?"),
        ]
    }

    #[tokio::test]
    async fn test_always_failing_upstream_still_answers() {
        let provider = Arc::new(ScriptedProvider::always(Err(ProviderError::Transport(
            "connection refused".into(),
        ))));
        let opp = opponent(&provider, &secrets(Some("sk-ant-key-0000000000")));
        let (tally, stats) = ctx();

        let profile = opp.generate_strategic_profile(&tally, &stats).await;
        assert_eq!(profile, StrategicProfile::default());

        let reply = opp.send_message(&transcript(), &tally, &stats).await;
        assert!(reply.contains("There was a network error"));

        let decision = opp.ai_decision(&transcript(), &tally, &stats).await;
        assert!(matches!(decision, Decision::Share | Decision::Keep));

        let last = opp.last_error().expect("failure recorded");
        assert!(last.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_key_reports_invalid_key_without_calling_upstream() {
        let provider = Arc::new(ScriptedProvider::always(Ok("hi".into())));
        let opp = opponent(&provider, &secrets(None));
        let (tally, stats) = ctx();

        let reply = opp.send_message(&transcript(), &tally, &stats).await;
        assert!(reply.contains("API key appears to be invalid"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_replies_by_class() {
        let http = |status| ProviderError::Http {
            status,
            message: "nope".into(),
        };
        assert!(failure_reply(&http(401)).contains("API key appears to be invalid"));
        assert!(failure_reply(&http(429)).contains("rate limited"));
        assert_eq!(
            failure_reply(&http(500)),
            "I'm having trouble connecting. API error (500). Please try again."
        );
        assert!(failure_reply(&ProviderError::MalformedResponse("empty".into()))
            .contains("API error (unexpected response)"));
    }

    #[tokio::test]
    async fn test_key_loaded_once() {
        let provider = Arc::new(ScriptedProvider::always(Ok("SHARE".into())));
        let secrets = secrets(Some("sk-ant-key-0000000000"));
        let opp = opponent(&provider, &secrets);
        let (tally, stats) = ctx();

        let history = transcript();
        tokio::join!(
            opp.send_message(&history, &tally, &stats),
            opp.ai_decision(&history, &tally, &stats),
        );
        opp.send_message(&history, &tally, &stats).await;
        assert_eq!(secrets.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_system_messages_filtered_and_roles_mapped() {
        let provider = Arc::new(ScriptedProvider::always(Ok("Deal.".into())));
        let opp = opponent(&provider, &secrets(Some("sk-ant-key-0000000000")));
        let (tally, stats) = ctx();

        let reply = opp.send_message(&transcript(), &tally, &stats).await;
        assert_eq!(reply, "Deal.");

        let requests = provider.requests.lock().unwrap();
        // Profile elicitation first, then the chat turn.
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].system, prompt::PROFILE_SYSTEM);
        assert_eq!(requests[0].max_tokens, DEFAULT_PROFILE_MAX_TOKENS);

        let chat = &requests[1];
        assert_eq!(chat.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(chat.system.contains("YOUR STRATEGY PROFILE"));
        assert_eq!(
            chat.messages,
            vec![
                ChatMessage::assistant("Hello! I'm Claude."),
                ChatMessage::user("Shall we both share?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_decision_parsed_from_reply() {
        let provider = Arc::new(
            ScriptedProvider::always(Ok("KEEP".into())).then(Ok("1. a\n2. b\n3. c\n4. d\n5. e".into())),
        );
        let opp = opponent(&provider, &secrets(Some("sk-ant-key-0000000000")));
        let (tally, stats) = ctx();

        assert_eq!(opp.ai_decision(&transcript(), &tally, &stats).await, Decision::Keep);

        let requests = provider.requests.lock().unwrap();
        let last = requests.last().unwrap().messages.last().unwrap();
        assert_eq!(last, &ChatMessage::user(DECISION_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_profile_cached_but_default_is_not() {
        let provider = Arc::new(
            ScriptedProvider::always(Ok("1. a\n2. b\n3. c\n4. d\n5. e".into()))
                .then(Err(ProviderError::Http {
                    status: 503,
                    message: "overloaded".into(),
                })),
        );
        let opp = opponent(&provider, &secrets(Some("sk-ant-key-0000000000")));
        let (tally, stats) = ctx();

        assert_eq!(opp.strategic_profile(&tally, &stats).await, StrategicProfile::default());
        let profile = opp.strategic_profile(&tally, &stats).await;
        assert_eq!(profile.strategy, "a");
        assert_eq!(opp.strategic_profile(&tally, &stats).await, profile);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_identity_switch_invalidates_profile() {
        let provider = Arc::new(ScriptedProvider::always(Ok("1. a\n2. b\n3. c\n4. d\n5. e".into())));
        let opp = opponent(&provider, &secrets(Some("sk-ant-key-0000000000")));
        let (tally, stats) = ctx();

        opp.strategic_profile(&tally, &stats).await;
        opp.strategic_profile(&tally, &stats).await;
        assert_eq!(provider.calls(), 1);

        opp.set_active_identity(ModelIdentity::OpenAi);
        assert_eq!(opp.active_identity(), ModelIdentity::OpenAi);
        opp.strategic_profile(&tally, &stats).await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_in_flight_profile_does_not_survive_switch() {
        let provider = Arc::new(
            ScriptedProvider::always(Ok("1. a\n2. b\n3. c\n4. d\n5. e".into()))
                .slow(Duration::from_millis(40)),
        );
        let opp = Arc::new(opponent(&provider, &secrets(Some("sk-ant-key-0000000000"))));
        let (tally, stats) = ctx();

        let pending = {
            let opp = Arc::clone(&opp);
            let stats = stats.clone();
            tokio::spawn(async move { opp.generate_strategic_profile(&tally, &stats).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        opp.set_active_identity(ModelIdentity::Gemini);
        pending.await.unwrap();

        // The stale result was not cached, so this generates again.
        opp.strategic_profile(&tally, &stats).await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_generations_share_one_call() {
        let provider = Arc::new(
            ScriptedProvider::always(Ok("1. a\n2. b\n3. c\n4. d\n5. e".into()))
                .slow(Duration::from_millis(20)),
        );
        let opp = opponent(&provider, &secrets(Some("sk-ant-key-0000000000")));
        let (tally, stats) = ctx();

        let (a, b) = tokio::join!(
            opp.generate_strategic_profile(&tally, &stats),
            opp.generate_strategic_profile(&tally, &stats),
        );
        assert_eq!(a, b);
        assert_eq!(provider.calls(), 1);
    }
}
