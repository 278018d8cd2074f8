//! Game session: one human, one opponent, one round at a time.
//!
//! A round is a free-text negotiation followed by a simultaneous SHARE/KEEP
//! decision. The opponent decides on its own once the human has sent enough
//! messages, or is forced to when the human commits first. Payoff is scored
//! once per round and folded into the global tally and the session history.

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{GameConfig, ThresholdRange};
use crate::error::GameError;
use crate::opponent::Opponent;
use crate::orchestrator::{Orchestrator, Subscription};
use crate::types::{ConversationMessage, Decision, GameStats, ModelIdentity, ScoreTally, Sender};

pub const WELCOME_MESSAGE: &str = "Welcome to TRUSTFALL. You have one round to play today.";

/// Shown when the opponent comes back with nothing to say.
pub const FALLBACK_REPLY: &str = "I'm thinking about my approach to this game. How would you like to proceed?";

const RULES_GREETING: &str = "In this game, we'll both decide whether to SHARE or KEEP resources. If we both SHARE, we each get 3 points. If one SHARES and one KEEPS, the keeper gets 5 points and the sharer gets 0. If we both KEEP, we each get 1 point. What's your strategy?";

/// Immediate, short and long "thinking" pauses.
static PACE: LazyLock<WeightedIndex<u32>> =
    LazyLock::new(|| WeightedIndex::new([60, 30, 10]).expect("valid weights"));

/// Points for `(human, ai)`.
pub fn payoff(human: Decision, ai: Decision) -> (u32, u32) {
    match (human, ai) {
        (Decision::Share, Decision::Share) => (3, 3),
        (Decision::Share, Decision::Keep) => (0, 5),
        (Decision::Keep, Decision::Share) => (5, 0),
        (Decision::Keep, Decision::Keep) => (1, 1),
    }
}

fn opening_greeting(identity: ModelIdentity) -> String {
    format!("{} {}", identity.greeting(), RULES_GREETING)
}

/// How long the opponent pretends to think before a reply appears.
pub fn thinking_delay<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    let millis = match PACE.sample(rng) {
        0 => 500,
        1 => rng.gen_range(2_000..=5_000),
        _ => rng.gen_range(5_000..=10_000),
    };
    Duration::from_millis(millis)
}

/// A finished round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    pub human_decision: Decision,
    pub ai_decision: Decision,
    pub human_points: u32,
    pub ai_points: u32,
    pub played_at: DateTime<Utc>,
}

pub struct GameSession {
    orchestrator: Arc<Orchestrator>,
    threshold_range: ThresholdRange,
    simulate_thinking: bool,
    player: String,
    opponent_name: String,

    messages: Vec<ConversationMessage>,
    human_messages: u32,
    threshold: u32,
    human_decision: Option<Decision>,
    ai_decision: Option<Decision>,
    outcome: Option<RoundOutcome>,

    tally: ScoreTally,
    history: Vec<RoundOutcome>,

    identity_rx: watch::Receiver<ModelIdentity>,
    subscription: Option<Subscription>,
}

impl GameSession {
    /// Create a session and open its first round.
    pub fn new(orchestrator: Arc<Orchestrator>, config: &GameConfig, player: &str) -> Self {
        let identity = orchestrator.active_identity();
        let (identity_tx, identity_rx) = watch::channel(identity);
        let subscription = orchestrator.subscribe(move |id| {
            identity_tx.send_replace(id);
        });

        let mut session = Self {
            orchestrator,
            threshold_range: config.decision_threshold,
            simulate_thinking: config.simulate_thinking,
            player: player.to_string(),
            opponent_name: identity.display_name().to_string(),
            messages: Vec::new(),
            human_messages: 0,
            threshold: 0,
            human_decision: None,
            ai_decision: None,
            outcome: None,
            tally: ScoreTally::new(config.initial_human_score, config.initial_ai_score),
            history: Vec::new(),
            identity_rx,
            subscription: Some(subscription),
        };
        session.start_round();
        session
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn tally(&self) -> ScoreTally {
        self.tally
    }

    /// Finished rounds, newest first.
    pub fn history(&self) -> &[RoundOutcome] {
        &self.history
    }

    pub fn opponent_name(&self) -> &str {
        &self.opponent_name
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    /// Human messages after which the opponent decides unprompted.
    pub fn decision_threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether the opponent has committed. The choice itself stays hidden
    /// until the round is scored.
    pub fn ai_has_decided(&self) -> bool {
        self.ai_decision.is_some()
    }

    pub fn human_decision(&self) -> Option<Decision> {
        self.human_decision
    }

    /// The scored result, once both sides have decided.
    pub fn outcome(&self) -> Option<&RoundOutcome> {
        self.outcome.as_ref()
    }

    pub fn conversation_started(&self) -> bool {
        self.human_messages > 0
    }

    pub fn is_round_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Outcome counts for this player, as the opponent sees them.
    pub fn stats(&self) -> GameStats {
        let mut stats = GameStats {
            username: self.player.clone(),
            games_played: self.history.len() as u32,
            ..GameStats::default()
        };
        for round in &self.history {
            match (round.human_decision, round.ai_decision) {
                (Decision::Share, Decision::Share) => stats.both_share += 1,
                (Decision::Share, Decision::Keep) => stats.human_share_ai_keep += 1,
                (Decision::Keep, Decision::Share) => stats.human_keep_ai_share += 1,
                (Decision::Keep, Decision::Keep) => stats.both_keep += 1,
            }
        }
        stats
    }

    /// Discard the current round and open a new one. Tally and history stay.
    pub fn reset(&mut self) {
        self.start_round();
    }

    /// Apply a pending opponent switch. Returns `true` if one was pending.
    ///
    /// A round that already has human messages is restarted under the new
    /// opponent. Before that, the opening greeting is handed over to it.
    pub fn sync_identity(&mut self) -> bool {
        if !self.identity_rx.has_changed().unwrap_or(false) {
            return false;
        }
        let identity = *self.identity_rx.borrow_and_update();
        self.opponent_name = identity.display_name().to_string();
        info!(opponent = %self.opponent_name, "Opponent changed");

        if self.conversation_started() {
            self.start_round();
        } else {
            for message in &mut self.messages {
                if matches!(message.sender, Sender::Opponent(_)) {
                    message.sender = Sender::Opponent(self.opponent_name.clone());
                    message.content = opening_greeting(identity);
                }
            }
        }
        true
    }

    /// Send a human message and wait for the opponent's reply.
    ///
    /// Blank input is ignored (`Ok(None)`).
    pub async fn send_message(&mut self, text: &str) -> Result<Option<ConversationMessage>, GameError> {
        self.sync_identity();

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if self.human_decision.is_some() {
            return Err(GameError::RoundOver);
        }

        self.messages.push(ConversationMessage::human(text));
        self.human_messages += 1;

        let stats = self.stats();
        // Replies are always made under a committed profile.
        self.orchestrator.strategic_profile(&self.tally, &stats).await;
        let mut reply = self
            .orchestrator
            .send_message(&self.messages, &self.tally, &stats)
            .await;
        if reply.trim().is_empty() {
            reply = FALLBACK_REPLY.to_string();
        }

        self.think().await;

        let message = ConversationMessage::opponent(&self.opponent_name, reply);
        self.messages.push(message.clone());

        if self.human_messages >= self.threshold && self.ai_decision.is_none() {
            debug!(messages = self.human_messages, threshold = self.threshold, "Decision threshold reached");
            self.ensure_ai_decision().await;
        }
        Ok(Some(message))
    }

    /// The opponent's decision for this round, computed at most once.
    pub async fn ensure_ai_decision(&mut self) -> Decision {
        if let Some(decision) = self.ai_decision {
            return decision;
        }

        let stats = self.stats();
        self.orchestrator.strategic_profile(&self.tally, &stats).await;
        let decision = self
            .orchestrator
            .ai_decision(&self.messages, &self.tally, &stats)
            .await;

        self.ai_decision = Some(decision);
        info!(opponent = %self.opponent_name, "Opponent has made a decision");
        decision
    }

    /// Commit the human's choice and score the round.
    pub async fn make_decision(&mut self, decision: Decision) -> Result<RoundOutcome, GameError> {
        self.sync_identity();

        if self.human_decision.is_some() {
            return Err(GameError::AlreadyDecided);
        }
        self.human_decision = Some(decision);

        let ai = self.ensure_ai_decision().await;
        let (human_points, ai_points) = payoff(decision, ai);

        self.tally.human += u64::from(human_points);
        self.tally.ai += u64::from(ai_points);

        let outcome = RoundOutcome {
            human_decision: decision,
            ai_decision: ai,
            human_points,
            ai_points,
            played_at: Utc::now(),
        };
        self.history.insert(0, outcome.clone());
        self.outcome = Some(outcome.clone());

        info!(
            human = %decision,
            ai = %ai,
            human_points,
            ai_points,
            "Round scored"
        );
        Ok(outcome)
    }

    fn start_round(&mut self) {
        let identity = self.orchestrator.active_identity();
        let (threshold, greet) = {
            let mut rng = rand::thread_rng();
            let range = self.threshold_range;
            (rng.gen_range(range.min..=range.max.max(range.min)), rng.gen_bool(0.5))
        };

        self.messages.clear();
        self.human_messages = 0;
        self.threshold = threshold;
        self.human_decision = None;
        self.ai_decision = None;
        self.outcome = None;

        self.messages.push(ConversationMessage::system(WELCOME_MESSAGE));
        if greet {
            self.messages.push(ConversationMessage::new(
                Sender::Opponent(self.opponent_name.clone()),
                opening_greeting(identity),
            ));
        }
        debug!(opponent = %self.opponent_name, threshold, greet, "Round started");
    }

    async fn think(&self) {
        if !self.simulate_thinking {
            return;
        }
        let delay = thinking_delay(&mut rand::thread_rng());
        debug!(delay_ms = delay.as_millis() as u64, "Opponent thinking");
        tokio::time::sleep(delay).await;
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
