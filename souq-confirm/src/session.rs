//! Session-scoped conversation context.
//!
//! A session identifies one conversation instance (one browser tab). It lives
//! in process memory only; durable storage is the surrounding app's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many recent messages to keep for the intent extractor.
const HISTORY_LIMIT: usize = 10;

/// A marketplace service the conversation has referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    /// Service identifier in the marketplace catalog
    pub service_id: String,
    /// Display name (e.g. "cleaning")
    pub name: String,
    /// Whether the provider accepts "earliest available" bookings,
    /// allowing the time to default when the user gives none
    #[serde(default)]
    pub supports_earliest: bool,
}

/// An active booking the session knows about, used to infer which booking
/// a bare "cancel" refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRef {
    pub booking_id: String,
    pub service_name: String,
}

/// Read-only conversation context the proposal builder consults.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Authenticated user, if any. Anonymous sessions may build proposals
    /// but cannot execute them.
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Service most recently mentioned in the conversation
    pub last_service: Option<ServiceRef>,
    /// Bookings the user currently holds
    pub active_bookings: Vec<BookingRef>,
    /// Recent raw messages, oldest first, bounded
    pub recent_history: Vec<String>,
}

impl SessionContext {
    /// Create a fresh session context.
    pub fn new(session_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
            created_at: Utc::now(),
            last_service: None,
            active_bookings: Vec::new(),
            recent_history: Vec::new(),
        }
    }

    /// Record a raw user message, keeping the history bounded.
    pub fn push_history(&mut self, text: &str) {
        self.recent_history.push(text.to_string());
        if self.recent_history.len() > HISTORY_LIMIT {
            self.recent_history.remove(0);
        }
    }
}
