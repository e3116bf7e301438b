//! Action executor: runs a confirmed proposal against the booking backend
//! exactly once.
//!
//! The token is consumed (and the pending slot cleared) atomically *before*
//! the external call, so a retried or duplicated confirmation cannot
//! re-trigger execution. A backend failure does not refund the token: the
//! confirmation was spent, and the user must re-initiate a fresh proposal
//! because the underlying state may have changed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::intent::ActionKind;
use crate::proposal::{ProposalAction, When};
use crate::store::{ConsumeFault, PendingStore};

/// Booking backend failures, reported distinctly from success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("booking not found: {0}")]
    NotFound(String),
    #[error("not allowed: {0}")]
    Denied(String),
    #[error("booking conflict: {0}")]
    Conflict(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// External mutating operations. Implementations must be safely callable
/// concurrently across sessions; the executor guarantees at most one call
/// per consumed token.
#[async_trait]
pub trait BookingBackend: Send + Sync {
    /// Create a booking and return its id.
    async fn create_booking(
        &self,
        user_id: &str,
        service_id: &str,
        when: &When,
    ) -> Result<String, BackendError>;

    /// Cancel an existing booking on behalf of the requesting user.
    async fn cancel_booking(
        &self,
        booking_id: &str,
        requesting_user: &str,
    ) -> Result<(), BackendError>;
}

/// Outcome status of executing (or declining) a confirmed proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Outcome of resolving a confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_kind: Option<ActionKind>,
    /// E.g. the created booking id on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_payload: Option<serde_json::Value>,
    /// Stable machine-readable reason on failure:
    /// "expired", "invalid", "sign_in_required" or "execution_failed"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Human-oriented detail (e.g. the backend's message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActionResult {
    pub fn succeeded(kind: ActionKind, payload: serde_json::Value) -> Self {
        Self {
            status: ActionStatus::Succeeded,
            action_kind: Some(kind),
            result_payload: Some(payload),
            error_reason: None,
            detail: None,
        }
    }

    pub fn cancelled(kind: ActionKind) -> Self {
        Self {
            status: ActionStatus::Cancelled,
            action_kind: Some(kind),
            result_payload: None,
            error_reason: None,
            detail: None,
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            status: ActionStatus::Failed,
            action_kind: None,
            result_payload: None,
            error_reason: Some(reason.to_string()),
            detail: None,
        }
    }

    fn execution_failed(kind: ActionKind, err: &BackendError) -> Self {
        Self {
            status: ActionStatus::Failed,
            action_kind: Some(kind),
            result_payload: None,
            error_reason: Some("execution_failed".to_string()),
            detail: Some(err.to_string()),
        }
    }

    fn from_fault(fault: &ConsumeFault) -> Self {
        if fault.is_expired() {
            Self::failed("expired")
        } else {
            Self::failed("invalid")
        }
    }
}

/// Executes confirmed proposals through the one consume-then-execute
/// transaction it owns.
pub struct ActionExecutor {
    store: Arc<PendingStore>,
    backend: Arc<dyn BookingBackend>,
}

impl ActionExecutor {
    pub fn new(store: Arc<PendingStore>, backend: Arc<dyn BookingBackend>) -> Self {
        Self { store, backend }
    }

    /// Resolve a confirmation for a session.
    ///
    /// `confirm = false` validates the token and discards the pending
    /// proposal without any side effect. `confirm = true` requires an
    /// authenticated user; without one the pending confirmation is left
    /// intact so the same token can succeed once the user signs in, within
    /// its TTL.
    pub async fn execute(
        &self,
        session_id: &str,
        presented_token: &str,
        user_id: Option<&str>,
        confirm: bool,
    ) -> ActionResult {
        if !confirm {
            return match self.store.reject(session_id, presented_token).await {
                Ok(proposal) => {
                    tracing::info!(session_id = %session_id, "Pending action rejected by user");
                    ActionResult::cancelled(proposal.action.kind())
                }
                Err(fault) => ActionResult::from_fault(&fault),
            };
        }

        // Authentication gate before the token is spent.
        let Some(user_id) = user_id else {
            return ActionResult::failed("sign_in_required");
        };

        let proposal = match self.store.consume(session_id, presented_token).await {
            Ok(proposal) => proposal,
            Err(fault) => return ActionResult::from_fault(&fault),
        };

        let kind = proposal.action.kind();
        let outcome = match &proposal.action {
            ProposalAction::Book {
                service: Some(service),
                when: Some(when),
            } => self
                .backend
                .create_booking(user_id, &service.service_id, when)
                .await
                // The payload carries the consumed proposal's identifiers so
                // callers can act on exactly what was executed without
                // re-reading the (already cleared) pending slot.
                .map(|booking_id| {
                    serde_json::json!({
                        "booking_id": booking_id,
                        "service_id": service.service_id,
                        "service_name": service.name,
                    })
                }),
            ProposalAction::Cancel {
                booking_id: Some(booking_id),
            } => self
                .backend
                .cancel_booking(booking_id, user_id)
                .await
                .map(|()| serde_json::json!({ "booking_id": booking_id })),
            // Incomplete proposals never receive tokens; treat as invalid
            // rather than panicking if the invariant is ever broken.
            _ => return ActionResult::failed("invalid"),
        };

        match outcome {
            Ok(payload) => {
                tracing::info!(
                    session_id = %session_id,
                    action = kind.kind_name(),
                    "Confirmed action executed"
                );
                ActionResult::succeeded(kind, payload)
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    action = kind.kind_name(),
                    error = %err,
                    "Confirmed action failed; token remains spent"
                );
                ActionResult::execution_failed(kind, &err)
            }
        }
    }
}

/// In-memory booking backend for tests and standalone runs.
#[derive(Default)]
pub struct InMemoryBookings {
    records: Mutex<HashMap<String, BookingRecord>>,
}

#[derive(Debug, Clone)]
struct BookingRecord {
    user_id: String,
    #[allow(dead_code)]
    service_id: String,
    cancelled: bool,
}

impl InMemoryBookings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing booking (e.g. made through the regular web flow).
    pub async fn seed_booking(&self, booking_id: &str, user_id: &str, service_id: &str) {
        self.records.lock().await.insert(
            booking_id.to_string(),
            BookingRecord {
                user_id: user_id.to_string(),
                service_id: service_id.to_string(),
                cancelled: false,
            },
        );
    }

    /// Whether a booking exists and is not cancelled.
    pub async fn is_active(&self, booking_id: &str) -> bool {
        self.records
            .lock()
            .await
            .get(booking_id)
            .is_some_and(|r| !r.cancelled)
    }

    pub async fn booking_count(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl BookingBackend for InMemoryBookings {
    async fn create_booking(
        &self,
        user_id: &str,
        service_id: &str,
        _when: &When,
    ) -> Result<String, BackendError> {
        let booking_id = format!("bk-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        self.records.lock().await.insert(
            booking_id.clone(),
            BookingRecord {
                user_id: user_id.to_string(),
                service_id: service_id.to_string(),
                cancelled: false,
            },
        );
        Ok(booking_id)
    }

    async fn cancel_booking(
        &self,
        booking_id: &str,
        requesting_user: &str,
    ) -> Result<(), BackendError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(booking_id)
            .ok_or_else(|| BackendError::NotFound(booking_id.to_string()))?;
        if record.user_id != requesting_user {
            return Err(BackendError::Denied(format!(
                "booking {booking_id} belongs to another user"
            )));
        }
        if record.cancelled {
            return Err(BackendError::Conflict(format!(
                "booking {booking_id} is already cancelled"
            )));
        }
        record.cancelled = true;
        Ok(())
    }
}
