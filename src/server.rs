//! Webhook HTTP surface.
//!
//! Three routes: the platform's subscription handshake (`GET /webhook`),
//! message delivery (`POST /webhook`) and a liveness probe (`GET /health`).
//! Handlers stay thin; everything interesting happens in [`Bot`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::bot::Bot;
use crate::channel::InboundMessage;

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
    /// Token the platform must echo during the handshake.
    pub verify_token: String,
}

/// Maps any handler error onto a 500 with a JSON body.
struct ServerError(anyhow::Error);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!("webhook handler failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listener and serves the router until the process stops.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    info!("webhook server listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Messenger-style subscription handshake: echo the challenge back when the
/// mode and the verify token match, refuse otherwise.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);

    if mode != Some("subscribe") || token != Some(state.verify_token.as_str()) {
        warn!("webhook verification rejected");
        return StatusCode::FORBIDDEN.into_response();
    }

    match params.get("hub.challenge") {
        Some(challenge) => challenge.clone().into_response(),
        None => StatusCode::FORBIDDEN.into_response(),
    }
}

async fn receive_webhook(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Result<impl IntoResponse, ServerError> {
    let conversation = state.bot.handle_inbound(message).await?;
    Ok(Json(json!({
        "status": "received",
        "conversation_id": conversation.id,
    })))
}
