//! Souq Gateway - HTTP surface for the conversational confirmation service.
//!
//! The gateway is stateless per request; all protocol state lives inside
//! [`souq_confirm::ChatService`]. Identity is resolved per request through
//! the [`auth::IdentityVerifier`] seam and handed to the protocol, which
//! enforces authentication at execution time.
//!
//! ```text
//! Client → Gateway (identity → route) → ChatService → Booking backend
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod auth;
pub mod routes;

pub use auth::{BearerIdentity, IdentityVerifier};
pub use routes::{chat_routes, ConfirmRequest, ErrorResponse, GatewayState, MessageRequest};

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use souq_common::config::Config;
use souq_confirm::{ChatService, InMemoryBookings, KeywordExtractor, Language};

/// Build the gateway router from configuration, with the built-in keyword
/// extractor and in-memory booking backend.
pub fn build_router(config: &Config) -> Router {
    let service = Arc::new(ChatService::new(
        Arc::new(KeywordExtractor::new()),
        Arc::new(InMemoryBookings::new()),
        config.confirmation.ttl_seconds,
        Language::from_tag(&config.locale.default_language),
    ));
    build_router_with(GatewayState {
        service,
        verifier: Arc::new(BearerIdentity),
    })
}

/// Build the gateway router around injected collaborators.
pub fn build_router_with(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    chat_routes(state).layer(cors)
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.gateway.host.parse::<std::net::IpAddr>()?,
        config.gateway.port,
    ));

    let router = build_router(config);

    tracing::info!("Starting Souq Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
