//! Proposal builder: turns a draft intent into a typed candidate action.
//!
//! Building is a pure function of the draft plus read-only session context.
//! The same inputs always produce the same missing-field set, and no side
//! effects happen here; incomplete proposals trigger a clarification prompt
//! instead of a token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::{ActionKind, DraftIntent};
use crate::session::{ServiceRef, SessionContext};

/// When a booking should happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum When {
    /// Explicit date and time as uttered by the user
    At { date: String, time: String },
    /// Provider-chosen earliest slot (only for services that support it)
    EarliestAvailable,
}

/// Candidate mutating action, one variant per supported kind.
///
/// Fields are optional while the proposal is incomplete; the missing-field
/// computation below is exhaustive over these schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalAction {
    Book {
        service: Option<ServiceRef>,
        when: Option<When>,
    },
    Cancel {
        booking_id: Option<String>,
    },
}

impl ProposalAction {
    /// Returns the action kind of this proposal.
    pub fn kind(&self) -> ActionKind {
        match self {
            ProposalAction::Book { .. } => ActionKind::Book,
            ProposalAction::Cancel { .. } => ActionKind::Cancel,
        }
    }

    /// Required fields still unresolved, in a fixed order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self {
            ProposalAction::Book { service, when } => {
                if service.is_none() {
                    missing.push("service_reference");
                }
                if when.is_none() {
                    missing.push("when");
                }
            }
            ProposalAction::Cancel { booking_id } => {
                if booking_id.is_none() {
                    missing.push("booking_id");
                }
            }
        }
        missing
    }
}

/// A candidate mutating action awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub action: ProposalAction,
    /// Required parameter names still unresolved, in a fixed order
    pub missing_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    fn new(action: ProposalAction) -> Self {
        let missing_fields = action
            .missing_fields()
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            action,
            missing_fields,
            created_at: Utc::now(),
        }
    }

    /// A proposal is complete iff no required field is missing. Only complete
    /// proposals may be confirmed.
    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }

    /// Parameters as a JSON object, for the client-facing confirmation block.
    pub fn parameters(&self) -> serde_json::Value {
        match &self.action {
            ProposalAction::Book { service, when } => serde_json::json!({
                "service": service,
                "when": when,
            }),
            ProposalAction::Cancel { booking_id } => serde_json::json!({
                "booking_id": booking_id,
            }),
        }
    }
}

/// Proposal building failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The extractor produced an action kind the protocol does not implement.
    #[error("unsupported intent: {0}")]
    UnsupportedIntent(String),
}

/// Build a proposal from a draft intent and read-only session context.
///
/// For `book`, the service may be inferred from the last service the
/// conversation mentioned; `when` may default to earliest-available when the
/// service supports it. For `cancel`, the booking id may be inferred only
/// when the session holds exactly one active booking; with more than one the
/// field is reported missing rather than guessed.
pub fn build_proposal(draft: &DraftIntent, ctx: &SessionContext) -> Result<Proposal, BuildError> {
    match draft.kind {
        ActionKind::Book => {
            let service = resolve_service(draft, ctx);
            let when = resolve_when(draft, service.as_ref());
            Ok(Proposal::new(ProposalAction::Book { service, when }))
        }
        ActionKind::Cancel => {
            let booking_id = draft.booking_id.clone().or_else(|| {
                if ctx.active_bookings.len() == 1 {
                    Some(ctx.active_bookings[0].booking_id.clone())
                } else {
                    None
                }
            });
            Ok(Proposal::new(ProposalAction::Cancel { booking_id }))
        }
        other => Err(BuildError::UnsupportedIntent(other.kind_name().to_string())),
    }
}

fn resolve_service(draft: &DraftIntent, ctx: &SessionContext) -> Option<ServiceRef> {
    match &draft.service {
        Some(name) => {
            // Prefer the context's entry so catalog flags carry over.
            if let Some(last) = &ctx.last_service {
                if last.name.eq_ignore_ascii_case(name) {
                    return Some(last.clone());
                }
            }
            Some(ServiceRef {
                service_id: format!("svc-{}", name.to_lowercase()),
                name: name.clone(),
                supports_earliest: false,
            })
        }
        None => ctx.last_service.clone(),
    }
}

fn resolve_when(draft: &DraftIntent, service: Option<&ServiceRef>) -> Option<When> {
    match (&draft.date, &draft.time) {
        (Some(date), Some(time)) => Some(When::At {
            date: date.clone(),
            time: time.clone(),
        }),
        _ => {
            // Date and time are required together; a service that supports
            // earliest-available may default instead.
            if service.is_some_and(|s| s.supports_earliest) {
                Some(When::EarliestAvailable)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BookingRef;

    fn ctx() -> SessionContext {
        SessionContext::new("s1", Some("user-1".into()))
    }

    fn book_draft(service: Option<&str>, date: Option<&str>, time: Option<&str>) -> DraftIntent {
        DraftIntent {
            kind: ActionKind::Book,
            service: service.map(String::from),
            date: date.map(String::from),
            time: time.map(String::from),
            booking_id: None,
        }
    }

    #[test]
    fn complete_book_proposal() {
        let draft = book_draft(Some("cleaning"), Some("tomorrow"), Some("10am"));
        let proposal = build_proposal(&draft, &ctx()).unwrap();
        assert!(proposal.is_complete());
        assert_eq!(proposal.action.kind(), ActionKind::Book);
    }

    #[test]
    fn book_without_when_is_incomplete() {
        let draft = book_draft(Some("cleaning"), None, None);
        let proposal = build_proposal(&draft, &ctx()).unwrap();
        assert_eq!(proposal.missing_fields, vec!["when"]);
        assert!(!proposal.is_complete());
    }

    #[test]
    fn book_with_only_date_is_incomplete() {
        let draft = book_draft(Some("cleaning"), Some("tomorrow"), None);
        let proposal = build_proposal(&draft, &ctx()).unwrap();
        assert_eq!(proposal.missing_fields, vec!["when"]);
    }

    #[test]
    fn book_without_anything_reports_both_fields_in_order() {
        let draft = book_draft(None, None, None);
        let proposal = build_proposal(&draft, &ctx()).unwrap();
        assert_eq!(proposal.missing_fields, vec!["service_reference", "when"]);
    }

    #[test]
    fn service_inferred_from_context() {
        let mut ctx = ctx();
        ctx.last_service = Some(ServiceRef {
            service_id: "svc-9".into(),
            name: "cleaning".into(),
            supports_earliest: false,
        });
        let draft = book_draft(None, Some("tomorrow"), Some("10am"));
        let proposal = build_proposal(&draft, &ctx).unwrap();
        assert!(proposal.is_complete());
        match proposal.action {
            ProposalAction::Book { service, .. } => {
                assert_eq!(service.unwrap().service_id, "svc-9");
            }
            _ => panic!("expected Book"),
        }
    }

    #[test]
    fn earliest_available_defaults_when_supported() {
        let mut ctx = ctx();
        ctx.last_service = Some(ServiceRef {
            service_id: "svc-9".into(),
            name: "cleaning".into(),
            supports_earliest: true,
        });
        let draft = book_draft(Some("cleaning"), None, None);
        let proposal = build_proposal(&draft, &ctx).unwrap();
        assert!(proposal.is_complete());
        match proposal.action {
            ProposalAction::Book { when, .. } => {
                assert_eq!(when, Some(When::EarliestAvailable));
            }
            _ => panic!("expected Book"),
        }
    }

    #[test]
    fn cancel_with_explicit_id() {
        let draft = DraftIntent {
            booking_id: Some("42".into()),
            ..DraftIntent::new(ActionKind::Cancel)
        };
        let proposal = build_proposal(&draft, &ctx()).unwrap();
        assert!(proposal.is_complete());
    }

    #[test]
    fn cancel_infers_single_active_booking() {
        let mut ctx = ctx();
        ctx.active_bookings.push(BookingRef {
            booking_id: "b-7".into(),
            service_name: "plumbing".into(),
        });
        let proposal = build_proposal(&DraftIntent::new(ActionKind::Cancel), &ctx).unwrap();
        match &proposal.action {
            ProposalAction::Cancel { booking_id } => {
                assert_eq!(booking_id.as_deref(), Some("b-7"));
            }
            _ => panic!("expected Cancel"),
        }
    }

    #[test]
    fn cancel_with_two_active_bookings_does_not_guess() {
        let mut ctx = ctx();
        for id in ["b-1", "b-2"] {
            ctx.active_bookings.push(BookingRef {
                booking_id: id.into(),
                service_name: "cleaning".into(),
            });
        }
        let proposal = build_proposal(&DraftIntent::new(ActionKind::Cancel), &ctx).unwrap();
        assert_eq!(proposal.missing_fields, vec!["booking_id"]);
    }

    #[test]
    fn reschedule_is_unsupported() {
        let err = build_proposal(&DraftIntent::new(ActionKind::Reschedule), &ctx()).unwrap_err();
        assert_eq!(err, BuildError::UnsupportedIntent("reschedule".into()));
    }

    #[test]
    fn build_is_deterministic() {
        let ctx = ctx();
        let draft = book_draft(None, None, None);
        let a = build_proposal(&draft, &ctx).unwrap();
        let b = build_proposal(&draft, &ctx).unwrap();
        assert_eq!(a.missing_fields, b.missing_fields);
        assert_eq!(a.action, b.action);
    }
}
