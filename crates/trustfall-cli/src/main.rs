//! trustfall CLI — play the negotiation game from a terminal.
//!
//! Usage:
//!   trustfall play          — Play rounds against the selected opponent
//!   trustfall select <m>    — Choose the opponent (claude, openai, gemini)
//!   trustfall profile       — Show the opponent's strategic profile
//!   trustfall status        — Show configuration and key status
//!   trustfall onboard       — Create a default configuration
//!   trustfall encrypt <key> — Encrypt an API key for config.json

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;

use trustfall_core::config::Config;
use trustfall_core::game::{GameSession, RoundOutcome};
use trustfall_core::opponent::Opponent;
use trustfall_core::orchestrator::Orchestrator;
use trustfall_core::secrets::vault::{self, Vault};
use trustfall_core::secrets::{clean_secret, mask_secret};
use trustfall_core::store::{FileStore, KeyValueStore, SELECTED_MODEL_KEY};
use trustfall_core::types::{ConversationMessage, Decision, GameStats, ModelIdentity, ScoreTally, Sender};

#[derive(Parser)]
#[command(
    name = "trustfall",
    version,
    about = "Negotiate, then SHARE or KEEP against an AI opponent",
    long_about = "trustfall: talk to an AI opponent, then both of you secretly choose to SHARE or KEEP.\n\nBoth SHARE: 3/3. One KEEPs: keeper 5, sharer 0. Both KEEP: 1/1."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play interactively
    Play {
        /// Your player name
        #[arg(short, long, default_value = "player")]
        name: String,

        /// Opponent to play against (switches the saved selection)
        #[arg(short, long)]
        model: Option<ModelIdentity>,

        /// Skip the opponent's simulated thinking pauses
        #[arg(long)]
        fast: bool,
    },

    /// Choose the opponent for future games
    Select {
        /// claude, openai or gemini
        model: ModelIdentity,
    },

    /// Generate and print the opponent's strategic profile
    Profile {
        /// Opponent to ask (default: the saved selection)
        #[arg(short, long)]
        model: Option<ModelIdentity>,
    },

    /// Create or reset the default configuration
    Onboard,

    /// Show configuration status
    Status,

    /// Encrypt an API key for storage in config.json
    Encrypt {
        /// The plaintext key
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Play { name, model, fast }) => cmd_play(&name, model, fast).await?,
        Some(Commands::Select { model }) => cmd_select(model)?,
        Some(Commands::Profile { model }) => cmd_profile(model).await?,
        Some(Commands::Onboard) => cmd_onboard()?,
        Some(Commands::Status) => cmd_status()?,
        Some(Commands::Encrypt { key }) => cmd_encrypt(&key)?,
        None => cmd_play("player", None, false).await?,
    }

    Ok(())
}

// ── Shared Setup ────────────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<()> {
    if let Err(errors) = config.validate() {
        eprintln!("\n  \x1b[31m❌ Configuration errors:\x1b[0m");
        for e in &errors {
            eprintln!("     • {}", e);
        }
        eprintln!();
        anyhow::bail!("Fix the above {} error(s) in config.json", errors.len());
    }
    Ok(())
}

/// Load and validate config, then wire the orchestrator over the saved state.
fn setup_orchestrator() -> Result<(Config, Arc<Orchestrator>)> {
    let config = Config::load()?;
    validate_config(&config)?;
    let store = Arc::new(FileStore::new(Config::state_path()));
    let orchestrator = Orchestrator::from_config(&config, store)?;
    Ok((config, Arc::new(orchestrator)))
}

fn print_message(message: &ConversationMessage) {
    match &message.sender {
        Sender::System => println!("  \x1b[33m{}\x1b[0m", message.content),
        Sender::You => println!("  \x1b[36mYOU:\x1b[0m {}", message.content),
        Sender::Opponent(name) => println!("  \x1b[32m{}:\x1b[0m {}", name, message.content),
    }
}

fn print_outcome(outcome: &RoundOutcome, opponent: &str) {
    println!();
    println!("  You chose {}. {} chose {}.", outcome.human_decision, opponent, outcome.ai_decision);
    println!("  You +{} | {} +{}", outcome.human_points, opponent, outcome.ai_points);
}

fn print_round_start(session: &GameSession) {
    println!("  ─────────────────────────────────────");
    for message in session.messages() {
        print_message(message);
    }
    println!();
}

// ── Play Command ────────────────────────────────────────────────────

async fn cmd_play(name: &str, model: Option<ModelIdentity>, fast: bool) -> Result<()> {
    let (mut config, orchestrator) = setup_orchestrator()?;
    if fast {
        config.game.simulate_thinking = false;
    }
    if let Some(model) = model {
        orchestrator.set_active_identity(model);
    }

    let mut session = GameSession::new(Arc::clone(&orchestrator), &config.game, name);

    println!();
    println!("  trustfall v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Opponent: {} | Backend: {}",
        session.opponent_name(),
        orchestrator.name()
    );
    println!();
    println!("  Talk, then decide with /share or /keep.");
    println!("  Other commands: /model <name>, /new, /score, /quit");
    print_round_start(&session);

    let stdin = io::stdin();
    loop {
        print!("  \x1b[36m>\x1b[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("  Goodbye! 👋");
                break;
            }
            "/new" => {
                session.reset();
                print_round_start(&session);
                continue;
            }
            "/score" => {
                let tally = session.tally();
                let stats = session.stats();
                println!("  Humans {} | AI {}", tally.human, tally.ai);
                println!(
                    "  Your games: {} (both share {}, you shared & AI kept {}, you kept & AI shared {}, both keep {})",
                    stats.games_played,
                    stats.both_share,
                    stats.human_share_ai_keep,
                    stats.human_keep_ai_share,
                    stats.both_keep
                );
                continue;
            }
            "/share" | "/keep" => {
                let decision = if input == "/share" {
                    Decision::Share
                } else {
                    Decision::Keep
                };
                match session.make_decision(decision).await {
                    Ok(outcome) => {
                        print_outcome(&outcome, session.opponent_name());
                        println!("  Type /new to play another round.\n");
                    }
                    Err(e) => eprintln!("  \x1b[31m{}\x1b[0m", e),
                }
                continue;
            }
            _ => {}
        }

        if let Some(rest) = input.strip_prefix("/model") {
            match rest.trim().parse::<ModelIdentity>() {
                Ok(model) => {
                    orchestrator.set_active_identity(model);
                    session.sync_identity();
                    println!("  Now playing against {}.", session.opponent_name());
                    print_round_start(&session);
                }
                Err(e) => eprintln!("  \x1b[31m{}\x1b[0m", e),
            }
            continue;
        }

        if input.starts_with('/') {
            eprintln!("  \x1b[31mUnknown command: {}\x1b[0m", input);
            continue;
        }

        let had_decided = session.ai_has_decided();
        match session.send_message(input).await {
            Ok(Some(reply)) => {
                print_message(&reply);
                if session.ai_has_decided() && !had_decided {
                    println!("  \x1b[2m({} has decided. Your move: /share or /keep)\x1b[0m", session.opponent_name());
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("  \x1b[31m{}\x1b[0m", e),
        }
    }

    Ok(())
}

// ── Select Command ──────────────────────────────────────────────────

fn cmd_select(model: ModelIdentity) -> Result<()> {
    let (_, orchestrator) = setup_orchestrator()?;
    orchestrator.set_active_identity(model);

    println!();
    println!("  ✅ Opponent set to {}", model.display_name());
    if !orchestrator.registered().contains(&model) {
        println!(
            "  ⚠️  No {} backend yet; games will be played by {}.",
            model.display_name(),
            orchestrator.default_identity().display_name()
        );
    }
    println!();
    Ok(())
}

// ── Profile Command ─────────────────────────────────────────────────

async fn cmd_profile(model: Option<ModelIdentity>) -> Result<()> {
    let (config, orchestrator) = setup_orchestrator()?;
    if let Some(model) = model {
        orchestrator.set_active_identity(model);
    }

    let tally = ScoreTally::new(config.game.initial_human_score, config.game.initial_ai_score);
    let stats = GameStats {
        username: "player".to_string(),
        ..GameStats::default()
    };
    let profile = orchestrator.generate_strategic_profile(&tally, &stats).await;

    println!();
    println!("  {} strategic profile", orchestrator.active_identity().display_name());
    println!("  ─────────────────────────────────────");
    for (facet, answer) in profile.answers() {
        println!("  \x1b[1m{}\x1b[0m", facet.question());
        println!("    {}", answer);
    }
    if let Some(err) = orchestrator.last_error() {
        println!();
        println!(
            "  ⚠️  Default profile shown; last error at {}: {}",
            err.timestamp.format("%H:%M:%S"),
            err.message
        );
    }
    println!();
    Ok(())
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard() -> Result<()> {
    let path = Config::write_default_template()?;
    println!();
    println!("  ✅ Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Edit the config file and add your API keys");
    println!("     (or run `trustfall encrypt <key>` and paste the result)");
    println!("  2. Run `trustfall play` to start a game");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load()?;

    println!();
    println!("  trustfall status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:    {}", config_path.display());
    } else {
        println!("  Config:    ❌ Not found (run `trustfall onboard`)");
        return Ok(());
    }

    if let Err(errors) = config.validate() {
        println!("  Problems:  ❌ {}", errors.join("; "));
    }

    for (name, entry) in config.providers.entries() {
        let key = clean_secret(&entry.api_key);
        let shown = if key.is_empty() {
            "❌ no key".to_string()
        } else if vault::is_encrypted(&key) {
            "✅ encrypted key".to_string()
        } else {
            format!("✅ {}", mask_secret(&key))
        };
        println!("  {:<10} {}", format!("{}:", name), shown);
    }

    let store = FileStore::new(Config::state_path());
    let selected = store
        .get(SELECTED_MODEL_KEY)
        .unwrap_or_else(|| format!("{} (default)", config.default_model));
    println!("  Opponent:  {}", selected);

    let vault = Vault::new(Config::vault_key_path());
    println!(
        "  Vault:     {}",
        if vault.key_path().exists() {
            "✅ key present"
        } else {
            "— no key yet"
        }
    );

    println!();
    Ok(())
}

// ── Encrypt Command ─────────────────────────────────────────────────

fn cmd_encrypt(key: &str) -> Result<()> {
    let vault = Vault::new(Config::vault_key_path());
    let sealed = vault.encrypt(&clean_secret(key))?;
    println!();
    println!("  Paste this as the apiKey value in config.json:");
    println!("  {}", sealed);
    println!();
    Ok(())
}
