//! Confirmation tokens: single-use bearer credentials binding one proposal
//! to one session.
//!
//! The token is a random opaque value resolved through server-side lookup.
//! Generation and validation are isolated here so the representation could
//! swap to a signed/stateless scheme without touching the rest of the
//! protocol.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::proposal::ProposalAction;

/// Token entropy in bytes (256 bits, well above the 128-bit floor).
const TOKEN_BYTES: usize = 32;

/// Why a presented token failed validation. Checked in this order; the first
/// failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenFault {
    #[error("token already consumed")]
    Consumed,
    #[error("token expired")]
    Expired,
    #[error("token does not match the pending confirmation")]
    Mismatch,
    #[error("token belongs to a different session")]
    SessionMismatch,
}

/// Single-use credential binding a proposal to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationToken {
    /// Opaque bearer value the client must round-trip
    pub token: String,
    pub session_id: String,
    /// Hash of the proposal action, to detect tampering or staleness
    pub fingerprint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set exactly once, atomically with validation
    pub consumed: bool,
}

impl ConfirmationToken {
    /// Mint a fresh token for the given session and proposal action.
    pub fn issue(session_id: &str, action: &ProposalAction, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: generate_token(),
            session_id: session_id.to_string(),
            fingerprint: fingerprint(action),
            issued_at: now,
            expires_at: now + ttl,
            consumed: false,
        }
    }

    /// Validate a presented token against this record and the proposal
    /// currently pending for the session.
    ///
    /// Check order is fixed: consumed, expiry, proposal fingerprint, session.
    pub fn validate(
        &self,
        presented: &str,
        session_id: &str,
        pending_action: &ProposalAction,
        now: DateTime<Utc>,
    ) -> Result<(), TokenFault> {
        if self.consumed {
            return Err(TokenFault::Consumed);
        }
        if now >= self.expires_at {
            return Err(TokenFault::Expired);
        }
        if presented != self.token || self.fingerprint != fingerprint(pending_action) {
            return Err(TokenFault::Mismatch);
        }
        if self.session_id != session_id {
            return Err(TokenFault::SessionMismatch);
        }
        Ok(())
    }
}

/// Generate an opaque token with fresh OS entropy.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 fingerprint of a proposal action over its canonical JSON encoding.
pub fn fingerprint(action: &ProposalAction) -> String {
    // Serialization of these enums cannot fail; fall back to the debug
    // rendering rather than panicking if it ever does.
    let encoded = serde_json::to_vec(action)
        .unwrap_or_else(|_| format!("{action:?}").into_bytes());
    hex::encode(Sha256::digest(&encoded))
}
