//! Strategic profiles: the opponent's one-time strategy commitment.
//!
//! A profile is five short answers elicited in a single model call. The
//! parser is best-effort and never fails: whatever it cannot find falls back
//! to the stock answer for that facet.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// `N.` numbering at the start of a line.
static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:\*\*)?\d+\.[ \t]*").expect("valid regex"));

/// Blank-line paragraph separator.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("valid regex"));

/// A short `Label:` prefix such as `Strategy Question:` or `**Trust**:`.
static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^:\n]{1,40}:\s*").expect("valid regex"));

/// One of the five things a profile commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Strategy,
    Trust,
    Motivation,
    Betrayal,
    Success,
}

impl Facet {
    /// Declaration order; also the order of the numbered questions.
    pub const ALL: [Facet; 5] = [
        Self::Strategy,
        Self::Trust,
        Self::Motivation,
        Self::Betrayal,
        Self::Success,
    ];

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Strategy => &["strategy", "plan", "approach"],
            Self::Trust => &["trust", "confidence"],
            Self::Motivation => &["motivation", "matters more", "priority"],
            Self::Betrayal => &["betrayal", "betray", "trust"],
            Self::Success => &["success", "winning", "define success"],
        }
    }

    /// The question as it is quoted back to the opponent in its system prompt.
    pub fn question(&self) -> &'static str {
        match self {
            Self::Strategy => "What's your plan for this game? Will you mostly share, mostly keep, or something else?",
            Self::Trust => "Do you generally trust the human player to share with you? Why or why not?",
            Self::Motivation => "What matters more to you: your individual score, the overall AI team score, or creating an interesting game?",
            Self::Betrayal => "If the human betrays your trust, how will you respond?",
            Self::Success => "How do you define success in this game?",
        }
    }

    pub fn default_answer(&self) -> &'static str {
        match self {
            Self::Strategy => "I plan to start cooperatively and adapt based on the human's actions, balancing cooperation with strategic self-interest.",
            Self::Trust => "I approach with cautious optimism, remaining open to cooperation while being prepared for possible defection.",
            Self::Motivation => "Creating an engaging game experience is most important, followed by contributing positively to the collective AI score.",
            Self::Betrayal => "If betrayed, I'll likely respond with a strategic 'keep' to signal awareness, but remain open to rebuilding trust if cooperation resumes.",
            Self::Success => "Success is creating a thoughtful interaction that reveals insights about cooperation and trust, regardless of the final score.",
        }
    }
}

/// The opponent's committed answers, surfaced verbatim in every prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategicProfile {
    pub strategy: String,
    pub trust: String,
    pub motivation: String,
    pub betrayal: String,
    pub success: String,
}

impl Default for StrategicProfile {
    fn default() -> Self {
        let mut profile = Self::empty();
        for facet in Facet::ALL {
            profile.set(facet, facet.default_answer());
        }
        profile
    }
}

impl StrategicProfile {
    fn empty() -> Self {
        Self {
            strategy: String::new(),
            trust: String::new(),
            motivation: String::new(),
            betrayal: String::new(),
            success: String::new(),
        }
    }

    pub fn get(&self, facet: Facet) -> &str {
        match facet {
            Facet::Strategy => &self.strategy,
            Facet::Trust => &self.trust,
            Facet::Motivation => &self.motivation,
            Facet::Betrayal => &self.betrayal,
            Facet::Success => &self.success,
        }
    }

    fn set(&mut self, facet: Facet, value: &str) {
        let slot = match facet {
            Facet::Strategy => &mut self.strategy,
            Facet::Trust => &mut self.trust,
            Facet::Motivation => &mut self.motivation,
            Facet::Betrayal => &mut self.betrayal,
            Facet::Success => &mut self.success,
        };
        *slot = value.to_string();
    }

    /// `(facet, answer)` pairs in declaration order.
    pub fn answers(&self) -> impl Iterator<Item = (Facet, &str)> + '_ {
        Facet::ALL.into_iter().map(move |f| (f, self.get(f)))
    }
}

/// Parse a five-answer response into a profile.
///
/// 1. Five or more `N.`-numbered segments map positionally.
/// 2. Otherwise blank-line paragraphs are matched by keyword, one paragraph
///    per facet. With five or more paragraphs, facets left unmatched take the
///    unused paragraphs in order.
/// 3. Anything still empty takes the facet's default answer.
pub fn parse_profile(text: &str) -> StrategicProfile {
    let mut profile = StrategicProfile::empty();

    let numbered = numbered_segments(text);
    if numbered.len() >= Facet::ALL.len() {
        for (facet, segment) in Facet::ALL.into_iter().zip(&numbered) {
            profile.set(facet, &clean_answer(segment));
        }
    } else {
        let paragraphs: Vec<&str> = PARAGRAPH_BREAK
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let mut used = vec![false; paragraphs.len()];

        for (i, paragraph) in paragraphs.iter().enumerate() {
            let lower = paragraph.to_lowercase();
            let matched = Facet::ALL.into_iter().find(|facet| {
                profile.get(*facet).is_empty()
                    && facet.keywords().iter().any(|k| lower.contains(k))
            });
            if let Some(facet) = matched {
                profile.set(facet, &clean_answer(paragraph));
                used[i] = true;
            }
        }

        if paragraphs.len() >= Facet::ALL.len() {
            let mut leftovers = paragraphs
                .iter()
                .zip(&used)
                .filter(|(_, used)| !**used)
                .map(|(paragraph, _)| *paragraph);
            for facet in Facet::ALL {
                if !profile.get(facet).is_empty() {
                    continue;
                }
                match leftovers.next() {
                    Some(paragraph) => profile.set(facet, &clean_answer(paragraph)),
                    None => break,
                }
            }
        }
    }

    for facet in Facet::ALL {
        if profile.get(facet).is_empty() {
            tracing::warn!(facet = ?facet, "Profile answer missing, using default");
            profile.set(facet, facet.default_answer());
        }
    }
    profile
}

/// Text following each numbering marker, up to the next marker.
fn numbered_segments(text: &str) -> Vec<&str> {
    let markers: Vec<_> = NUMBERED.find_iter(text).collect();
    markers
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let end = markers.get(i + 1).map_or(text.len(), |next| next.start());
            text[m.end()..end].trim()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Drop leading numbering, a short label, and stray markdown emphasis.
fn clean_answer(raw: &str) -> String {
    let trimmed = raw.trim();
    let unnumbered = NUMBERED.replace(trimmed, "");
    let unlabeled = LABEL.replace(&unnumbered, "");
    unlabeled
        .trim()
        .trim_start_matches("**")
        .trim()
        .to_string()
}
