//! Intent extraction boundary.
//!
//! The protocol treats intent extraction as a black box: given a raw
//! utterance and recent conversation history it returns either a structured
//! draft intent or nothing. A remote LLM can sit behind [`IntentExtractor`];
//! the built-in [`KeywordExtractor`] covers standalone operation with
//! bilingual (English/Arabic) regex heuristics.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of mutating action a draft intent asks for.
///
/// `Reschedule` is recognized by extractors but not implemented by the
/// protocol; the proposal builder rejects it as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Book,
    Cancel,
    Reschedule,
}

impl ActionKind {
    /// Returns the kind name as a string for display and logging.
    pub fn kind_name(self) -> &'static str {
        match self {
            ActionKind::Book => "book",
            ActionKind::Cancel => "cancel",
            ActionKind::Reschedule => "reschedule",
        }
    }
}

/// Structured output of the intent extractor. All entity fields are raw
/// strings; resolution against session context happens in the proposal
/// builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftIntent {
    pub kind: ActionKind,
    /// Service the user named, if any (e.g. "cleaning")
    #[serde(default)]
    pub service: Option<String>,
    /// Date expression as uttered (e.g. "tomorrow", "2026-09-01")
    #[serde(default)]
    pub date: Option<String>,
    /// Time expression as uttered (e.g. "10am", "14:30")
    #[serde(default)]
    pub time: Option<String>,
    /// Booking id the user referenced, if any
    #[serde(default)]
    pub booking_id: Option<String>,
}

impl DraftIntent {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            service: None,
            date: None,
            time: None,
            booking_id: None,
        }
    }
}

/// External collaborator boundary: free text in, draft intent (or nothing) out.
///
/// Implementations must never panic on malformed input; returning `None`
/// degrades to a clarification prompt.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn classify(&self, text: &str, recent_history: &[String]) -> Option<DraftIntent>;
}

/// Bilingual service vocabulary: (keyword, canonical service name).
const SERVICE_WORDS: &[(&str, &str)] = &[
    ("cleaning", "cleaning"),
    ("تنظيف", "cleaning"),
    ("plumbing", "plumbing"),
    ("سباكة", "plumbing"),
    ("electrical", "electrical"),
    ("كهرباء", "electrical"),
    ("gardening", "gardening"),
    ("بستنة", "gardening"),
    ("painting", "painting"),
    ("دهان", "painting"),
    ("moving", "moving"),
    ("نقل", "moving"),
];

/// Regex-based bilingual intent extractor.
///
/// Deliberately conservative: it only reports an intent when an explicit
/// action verb appears, and leaves entity fields unset rather than guessing.
pub struct KeywordExtractor {
    cancel_re: Regex,
    book_re: Regex,
    reschedule_re: Regex,
    time_re: Regex,
    date_re: Regex,
    booking_id_re: Regex,
}

impl KeywordExtractor {
    pub fn new() -> Self {
        // Patterns are fixed; construction cannot fail at runtime.
        Self {
            cancel_re: Regex::new(r"(?i)\bcancel\b|إلغاء|الغاء|ألغِ|الغي").unwrap(),
            book_re: Regex::new(r"(?i)\b(book|reserve|schedule)\b|احجز|أحجز|حجز").unwrap(),
            reschedule_re: Regex::new(r"(?i)\b(reschedule|postpone)\b|تأجيل|تغيير الموعد")
                .unwrap(),
            time_re: Regex::new(r"(?i)\b(\d{1,2}:\d{2}\s*(?:am|pm)?|\d{1,2}\s*(?:am|pm))\b")
                .unwrap(),
            date_re: Regex::new(
                r"(?i)\b(today|tomorrow|monday|tuesday|wednesday|thursday|friday|saturday|sunday|\d{4}-\d{2}-\d{2})\b|اليوم|غداً|غدا",
            )
            .unwrap(),
            booking_id_re: Regex::new(r"(?i)booking\s*#?\s*([0-9a-z-]+)|حجز\s*(?:رقم\s*)?#?\s*([0-9a-z-]+)|#([0-9a-z-]+)")
                .unwrap(),
        }
    }

    fn extract_service(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        SERVICE_WORDS
            .iter()
            .find(|(word, _)| lowered.contains(word))
            .map(|(_, canonical)| (*canonical).to_string())
    }

    fn extract_booking_id(&self, text: &str) -> Option<String> {
        self.booking_id_re.captures(text).and_then(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().to_string())
        })
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentExtractor for KeywordExtractor {
    async fn classify(&self, text: &str, _recent_history: &[String]) -> Option<DraftIntent> {
        // Reschedule and cancel are checked before book: "cancel my cleaning
        // booking" and "reschedule the booking" both mention bookings.
        let kind = if self.reschedule_re.is_match(text) {
            ActionKind::Reschedule
        } else if self.cancel_re.is_match(text) {
            ActionKind::Cancel
        } else if self.book_re.is_match(text) {
            ActionKind::Book
        } else {
            return None;
        };

        let mut draft = DraftIntent::new(kind);
        draft.service = self.extract_service(text);
        draft.time = self
            .time_re
            .captures(text)
            .map(|c| c[1].trim().to_string());
        draft.date = self
            .date_re
            .find(text)
            .map(|m| m.as_str().to_lowercase());
        draft.booking_id = self.extract_booking_id(text);
        Some(draft)
    }
}
