//! HTTP routes for the chat confirmation gateway.
//!
//! Two endpoints drive the protocol: `/chat/message` for free-text turns
//! and `/chat/confirm` for explicit token resolution. The confirm endpoint
//! is the canonical channel; clients that render a confirmation card post
//! the token here with a boolean decision.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use souq_common::Error;
use souq_confirm::{ActionResult, ActionStatus, ChatReply, ChatService};

use crate::auth::IdentityVerifier;

/// Shared state for all chat routes.
#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<ChatService>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// Request body for a free-text chat turn.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    pub text: String,
}

/// Request body for explicit confirmation resolution.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub session_id: String,
    pub token: String,
    /// true executes the pending action, false discards it
    pub confirm: bool,
}

/// Error body for rejected requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    fn from_error(err: Error) -> (StatusCode, Json<ErrorResponse>) {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
    }
}

/// Build the chat API routes.
pub fn chat_routes(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/chat/message", post(handle_message))
        .route("/api/v1/chat/confirm", post(handle_confirm))
        .route("/health", get(health))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "souq-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Handle a free-text chat message.
///
/// POST /api/v1/chat/message
async fn handle_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(request): Json<MessageRequest>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ErrorResponse>)> {
    if request.session_id.is_empty() {
        return Err(ErrorResponse::from_error(Error::InvalidInput(
            "session_id is required".into(),
        )));
    }
    if request.text.trim().is_empty() {
        return Err(ErrorResponse::from_error(Error::InvalidInput(
            "text is required".into(),
        )));
    }

    let user_id = state.verifier.verify(&headers).await;
    let reply = state
        .service
        .handle_message(&request.session_id, &request.text, user_id)
        .await;
    Ok(Json(reply))
}

/// Resolve a pending confirmation with an explicit decision.
///
/// POST /api/v1/chat/confirm
async fn handle_confirm(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(request): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<ActionResult>), (StatusCode, Json<ErrorResponse>)> {
    if request.session_id.is_empty() {
        return Err(ErrorResponse::from_error(Error::InvalidInput(
            "session_id is required".into(),
        )));
    }
    if request.token.is_empty() {
        return Err(ErrorResponse::from_error(Error::InvalidInput(
            "token is required".into(),
        )));
    }

    let user_id = state.verifier.verify(&headers).await;
    let result = state
        .service
        .handle_confirmation(
            &request.session_id,
            &request.token,
            request.confirm,
            user_id.as_deref(),
        )
        .await;

    Ok((result_status(&result), Json(result)))
}

/// Map an action result to an HTTP status.
fn result_status(result: &ActionResult) -> StatusCode {
    match result.status {
        ActionStatus::Succeeded | ActionStatus::Cancelled => StatusCode::OK,
        ActionStatus::Failed => match result.error_reason.as_deref() {
            Some("sign_in_required") => StatusCode::UNAUTHORIZED,
            Some("expired") => StatusCode::GONE,
            Some("invalid") => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        },
    }
}
