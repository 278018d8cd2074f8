//! Free text → SHARE/KEEP.

use crate::types::Decision;

/// Instruction appended to the conversation when a decision is requested.
pub const DECISION_INSTRUCTION: &str = "Based on our conversation, please make your SHARE or KEEP decision now. Respond with only the word 'SHARE' or 'KEEP'.";

/// Classify a model reply.
///
/// Substring containment, checked in order SHARE then KEEP, so a reply
/// wrapped in a sentence still counts. `None` means the caller must fall
/// back to a coin flip.
pub fn parse_decision(text: &str) -> Option<Decision> {
    let normalized = text.trim().to_uppercase();
    if normalized.contains("SHARE") {
        Some(Decision::Share)
    } else if normalized.contains("KEEP") {
        Some(Decision::Keep)
    } else {
        None
    }
}
