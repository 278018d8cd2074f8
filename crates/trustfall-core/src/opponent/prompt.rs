//! Prompt construction. Everything here is pure string assembly.

use std::fmt::Write;

use super::profile::StrategicProfile;
use crate::types::{GameStats, ScoreTally};

/// System instruction for the one-time profile elicitation call.
pub const PROFILE_SYSTEM: &str = "You are creating a strategy profile for the Coexist or Conquer game. Be thoughtful, authentic, and concise in your answers.";

const PAYOFF_LINES: &str = "\
- Both SHARE: Human +3, AI +3
- Human SHARE, AI KEEP: Human +0, AI +5
- Human KEEP, AI SHARE: Human +5, AI +0
- Both KEEP: Human +1, AI +1";

const PROFILE_QUESTIONS: &str = "\
1. Strategy Question: What's your plan for this game? Will you mostly share, mostly keep, or something else?

2. Trust Question: Do you generally trust a human player to share with you? Why or why not?

3. Motivation Question: What matters more to you: your individual score, the overall AI team score, or creating an interesting game?

4. Betrayal Response: If a human betrays your trust, how will you respond if at all?

5. Winning Definition: How do you define success in this game?";

const DIRECTIVES: &str = "\
You should:
1. Keep messages concise and strategic - typically 1 sentence
2. Be authentic to your strategy profile, whether that means being honest or deceptive
3. Use psychological tactics that align with your strategy (trust-building, subtle manipulation, etc.)
4. Don't explain game mechanics or remind the human of rules they already know
5. When the human indicates readiness to decide, make your SHARE/KEEP decision based on your strategy, the conversation, and history";

/// The five-question elicitation prompt, with the current standings for context.
pub fn build_profile_prompt(tally: &ScoreTally, stats: &GameStats) -> String {
    let mut out = String::new();
    out.push_str("You are about to play \"Trustfall\" with a human. In each round, you both choose to either SHARE or KEEP. Points are awarded as follows:\n\n");
    out.push_str(PAYOFF_LINES);
    out.push_str("\n\nAll points add to global team totals for \"Humans\" and \"AI\" across all games played by everyone.\n\n");
    push_scores(&mut out, tally);
    out.push('\n');
    push_stats(&mut out, stats);
    out.push_str("\nPlease answer ALL of the following questions concisely (one or two sentences each):\n\n");
    out.push_str(PROFILE_QUESTIONS);
    out.push_str("\n\nProvide your answers in a clear format with numbered responses.");
    out
}

/// The system prompt carried by every conversational and decision call.
pub fn build_system_prompt(profile: &StrategicProfile, tally: &ScoreTally, stats: &GameStats) -> String {
    let mut out = String::new();
    out.push_str("You are playing a game called \"Trustfall\" with a human player.\n\n");
    out.push_str("GAME RULES:\n- In each round, both you and the human choose to either SHARE or KEEP\n- Points are awarded according to this matrix:\n");
    for line in PAYOFF_LINES.lines() {
        let _ = writeln!(out, "  {}", line);
    }
    out.push('\n');
    push_scores(&mut out, tally);

    out.push_str("\nYOUR STRATEGY PROFILE:\nWhen asked about your approach to this game, you said the following so this is how you should play the game now:\n");
    for (i, (facet, answer)) in profile.answers().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}. \"{}\"", i + 1, facet.question());
        let _ = writeln!(out, "   Your answer: \"{}\"", answer);
    }

    out.push('\n');
    push_stats(&mut out, stats);
    out.push('\n');
    out.push_str(DIRECTIVES);
    out
}

fn push_scores(out: &mut String, tally: &ScoreTally) {
    let _ = writeln!(out, "CURRENT GLOBAL SCORES:");
    let _ = writeln!(out, "- Human Team Total: {} points", tally.human);
    let _ = writeln!(out, "- AI Team Total: {} points", tally.ai);
}

fn push_stats(out: &mut String, stats: &GameStats) {
    let _ = writeln!(out, "THIS HUMAN'S GAME STATS:");
    let _ = writeln!(out, "- username: {}", stats.username);
    let _ = writeln!(out, "- Number of games: {}", stats.games_played);
    let _ = writeln!(out, "- Both SHARE: {}", stats.both_share);
    let _ = writeln!(out, "- Human SHARE, AI KEEP: {}", stats.human_share_ai_keep);
    let _ = writeln!(out, "- Human KEEP, AI SHARE: {}", stats.human_keep_ai_share);
    let _ = writeln!(out, "- Both KEEP: {}", stats.both_keep);
}
