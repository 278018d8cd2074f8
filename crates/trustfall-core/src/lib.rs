//! trustfall-core: the engine behind the trustfall negotiation game.
//!
//! A human and an LLM-backed opponent talk, then each secretly picks SHARE
//! or KEEP. This crate holds everything below the user interface:
//!
//! - [`config`] — Typed configuration loading from JSON
//! - [`provider`] — Vendor wire formats (Anthropic Messages, OpenAI Chat Completions)
//! - [`secrets`] — API key resolution, caching and encryption at rest
//! - [`opponent`] — The opponent contract, strategic profiles, prompts and decision parsing
//! - [`orchestrator`] — Routes requests to whichever opponent is selected
//! - [`game`] — Rounds, payoff and score bookkeeping
//! - [`store`] — Small persistent client state
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use trustfall_core::config::Config;
//! use trustfall_core::game::GameSession;
//! use trustfall_core::orchestrator::Orchestrator;
//! use trustfall_core::store::FileStore;
//! use trustfall_core::types::Decision;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let store = Arc::new(FileStore::new(Config::state_path()));
//! let orchestrator = Arc::new(Orchestrator::from_config(&config, store)?);
//!
//! let mut session = GameSession::new(orchestrator, &config.game, "player");
//! session.send_message("Shall we both share?").await?;
//! let outcome = session.make_decision(Decision::Share).await?;
//! println!("you +{}, ai +{}", outcome.human_points, outcome.ai_points);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod game;
pub mod opponent;
pub mod orchestrator;
pub mod provider;
pub mod secrets;
pub mod singleflight;
pub mod store;
pub mod types;
