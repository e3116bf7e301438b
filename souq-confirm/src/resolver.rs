//! Confirmation resolver: classifies a follow-up message relative to the
//! pending proposal.
//!
//! Classification is a fixed, case-insensitive whole-message match.
//! Restricting to whole messages (not substrings) avoids false positives
//! from unrelated sentences that happen to contain "no" or "ok".

use serde::Serialize;

use crate::store::PendingStore;

/// Outcome of classifying a follow-up message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Affirm,
    Reject,
    Unrelated,
}

/// Whole-message affirmatives, English and Arabic.
const AFFIRMATIVES: &[&str] = &[
    "yes", "yeah", "yep", "y", "ok", "okay", "sure", "confirm", "confirmed", "نعم", "اي", "ايوه",
    "أيوه", "تمام", "موافق", "اكد", "أكد",
];

/// Whole-message negatives, English and Arabic.
const NEGATIVES: &[&str] = &[
    "no", "n", "nope", "cancel", "stop", "لا", "كلا", "الغاء", "إلغاء", "توقف",
];

/// Classify a raw message against the fixed affirmative/negative sets.
///
/// Pure function; whether a confirmation is actually pending is [`resolve`]'s
/// concern.
pub fn classify_reply(text: &str) -> Resolution {
    let normalized = text
        .trim()
        .trim_end_matches(['.', '!', '?', '؟', '،', ','])
        .to_lowercase();

    if AFFIRMATIVES.contains(&normalized.as_str()) {
        Resolution::Affirm
    } else if NEGATIVES.contains(&normalized.as_str()) {
        Resolution::Reject
    } else {
        Resolution::Unrelated
    }
}

/// Resolve a message for a session.
///
/// Without a pending confirmation the resolver short-circuits to `Unrelated`
/// regardless of content: a user cannot confirm nothing. An ambiguous
/// message while a confirmation is pending is also `Unrelated` and leaves
/// the pending slot intact, so the user may still answer on a later turn
/// (subject to token expiry).
pub async fn resolve(store: &PendingStore, session_id: &str, text: &str) -> Resolution {
    if store.get(session_id).await.is_none() {
        return Resolution::Unrelated;
    }
    classify_reply(text)
}
