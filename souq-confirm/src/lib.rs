//! Souq Confirm - Conversational action confirmation protocol.
//!
//! A free-text chat message may only trigger a mutating marketplace action
//! (create a booking, cancel a booking) after an explicit user confirmation
//! bound to that exact proposed action.
//!
//! ## Architecture
//!
//! ```text
//! Message → Intent Extractor → Proposal Builder → Token Issuer → Pending Store
//!                                                                     ↓
//! Next message → Confirmation Resolver → Action Executor → Booking Backend
//! ```
//!
//! The protocol guarantees:
//! - at most one pending confirmation per session (a new proposal supersedes
//!   and invalidates the previous token),
//! - single-shot execution (the token is consumed atomically before the
//!   backend call, so duplicate confirmations can never re-trigger it),
//! - hard TTL on pending confirmations, enforced lazily at resolution time.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod executor;
pub mod intent;
pub mod proposal;
pub mod resolver;
pub mod service;
pub mod session;
pub mod store;
pub mod token;

pub use executor::{
    ActionExecutor, ActionResult, ActionStatus, BackendError, BookingBackend, InMemoryBookings,
};
pub use intent::{ActionKind, DraftIntent, IntentExtractor, KeywordExtractor};
pub use proposal::{build_proposal, BuildError, Proposal, ProposalAction, When};
pub use resolver::{classify_reply, resolve, Resolution};
pub use service::{ChatReply, ChatService, Language, PendingPrompt};
pub use session::{BookingRef, ServiceRef, SessionContext};
pub use store::{ConsumeFault, IssueError, PendingConfirmation, PendingStore};
pub use token::ConfirmationToken;
