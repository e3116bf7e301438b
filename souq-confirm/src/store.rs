//! Pending confirmation store: the protocol's only mutable shared state.
//!
//! One slot per session, holding at most one outstanding (proposal, token)
//! pair. The store exclusively owns the mapping; issuing, reading, clearing
//! and consuming all happen under one async mutex, which serializes
//! concurrent messages for the same session (and makes check-and-consume a
//! single critical section). Expiry is lazy: it is detected when a token is
//! consumed, not by a background sweeper.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::proposal::Proposal;
use crate::token::{ConfirmationToken, TokenFault};

/// The (proposal, token) pair currently awaiting user response for a session.
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub proposal: Proposal,
    pub token: ConfirmationToken,
}

/// Issuing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    /// The proposal still has missing fields; the caller must resolve them
    /// (by asking the user) before a token can be issued.
    #[error("proposal is incomplete: missing {0:?}")]
    IncompleteProposal(Vec<String>),
}

/// Why consuming a token failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConsumeFault {
    /// No confirmation is pending for the session
    #[error("no pending confirmation for this session")]
    NoPending,
    #[error(transparent)]
    Token(#[from] TokenFault),
}

impl ConsumeFault {
    /// True when the failure is expiry (as opposed to an invalid token).
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Token(TokenFault::Expired))
    }
}

/// Session-keyed store of pending confirmations.
pub struct PendingStore {
    ttl: Duration,
    slots: Mutex<HashMap<String, PendingConfirmation>>,
}

impl PendingStore {
    /// Create a store whose tokens live for `ttl_seconds`.
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds as i64),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a token for a complete proposal, atomically superseding any
    /// existing pending confirmation for the session. Supersession
    /// invalidates the old token even if unexpired, so a stale "yes" can
    /// never fire an outdated proposal.
    pub async fn issue(
        &self,
        session_id: &str,
        proposal: Proposal,
    ) -> Result<ConfirmationToken, IssueError> {
        if !proposal.is_complete() {
            return Err(IssueError::IncompleteProposal(
                proposal.missing_fields.clone(),
            ));
        }

        let action = proposal.action.kind().kind_name();
        let token = ConfirmationToken::issue(session_id, &proposal.action, self.ttl);
        let mut slots = self.slots.lock().await;
        let superseded = slots
            .insert(
                session_id.to_string(),
                PendingConfirmation {
                    proposal,
                    token: token.clone(),
                },
            )
            .is_some();

        tracing::info!(
            session_id = %session_id,
            action = action,
            superseded = superseded,
            "Issued confirmation token"
        );
        Ok(token)
    }

    /// Read-only lookup of the pending confirmation for a session.
    pub async fn get(&self, session_id: &str) -> Option<PendingConfirmation> {
        self.slots.lock().await.get(session_id).cloned()
    }

    /// Remove the pending slot for a session, if any.
    pub async fn clear(&self, session_id: &str) {
        self.slots.lock().await.remove(session_id);
    }

    /// Validate and consume a presented token in one critical section.
    ///
    /// On success the token is marked consumed and the slot cleared before
    /// this returns, so a duplicated confirmation observes `NoPending`. An
    /// expired token clears the slot (lazy expiry); a mismatched token
    /// leaves the current pending confirmation intact.
    pub async fn consume(
        &self,
        session_id: &str,
        presented: &str,
    ) -> Result<Proposal, ConsumeFault> {
        let mut slots = self.slots.lock().await;
        let pending = slots.get(session_id).ok_or(ConsumeFault::NoPending)?;

        match pending
            .token
            .validate(presented, session_id, &pending.proposal.action, Utc::now())
        {
            Ok(()) => {
                // Invariant: consumed is set and the slot cleared while still
                // holding the lock, before any external call can happen.
                let mut entry = slots.remove(session_id).ok_or(ConsumeFault::NoPending)?;
                entry.token.consumed = true;
                tracing::debug!(session_id = %session_id, "Confirmation token consumed");
                Ok(entry.proposal)
            }
            Err(TokenFault::Expired) => {
                slots.remove(session_id);
                tracing::debug!(session_id = %session_id, "Pending confirmation expired");
                Err(TokenFault::Expired.into())
            }
            Err(fault) => Err(fault.into()),
        }
    }

    /// Validate a presented token and clear the slot without consuming it
    /// for execution (the rejection path). A mismatched token cannot clear
    /// somebody else's pending confirmation.
    pub async fn reject(
        &self,
        session_id: &str,
        presented: &str,
    ) -> Result<Proposal, ConsumeFault> {
        let mut slots = self.slots.lock().await;
        let pending = slots.get(session_id).ok_or(ConsumeFault::NoPending)?;

        match pending
            .token
            .validate(presented, session_id, &pending.proposal.action, Utc::now())
        {
            Ok(()) => {
                let entry = slots.remove(session_id).ok_or(ConsumeFault::NoPending)?;
                tracing::debug!(session_id = %session_id, "Pending confirmation rejected");
                Ok(entry.proposal)
            }
            Err(TokenFault::Expired) => {
                slots.remove(session_id);
                Err(TokenFault::Expired.into())
            }
            Err(fault) => Err(fault.into()),
        }
    }
}
