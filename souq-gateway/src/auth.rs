//! Identity resolution for gateway requests.
//!
//! Identity is optional on every endpoint: browsing and proposing actions
//! work anonymously, and the confirmation protocol itself decides (at
//! execution time) whether a signed-in user is required.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

/// Resolves the requesting user from request headers, if any.
///
/// The seam exists so deployments can plug in real session or JWT
/// verification without touching the route handlers.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Return the verified user id, or `None` for anonymous requests.
    async fn verify(&self, headers: &HeaderMap) -> Option<String>;
}

/// Development verifier: accepts `Authorization: Bearer <user-id>` at face
/// value. Suitable for local runs and tests only.
pub struct BearerIdentity;

#[async_trait]
impl IdentityVerifier for BearerIdentity {
    async fn verify(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}
