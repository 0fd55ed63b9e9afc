//! Query API for the AgriChain dashboard

pub mod error;
pub mod handlers;
pub mod session;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub batch_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_kid: Option<String>,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let batches = state.ledger.batches().await;

    Json(ReadyResponse {
        ready: batches.is_ok(),
        batch_count: batches.map(|ids| ids.len()).unwrap_or(0),
        receipt_kid: state.ledger.receipt_key().map(|key| key.kid().to_string()),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration for the browser dashboard
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Batch endpoints
        .route(
            "/v1/batches",
            get(handlers::list_batches).post(handlers::create_batch),
        )
        .route("/v1/batches/{id}", get(handlers::get_batch))
        .route("/v1/batches/{id}/transport", post(handlers::record_transport))
        .route("/v1/batches/{id}/listing", post(handlers::list_for_sale))
        .route("/v1/batches/{id}/sale", post(handlers::sell))
        .route("/v1/batches/{id}/code", get(handlers::batch_code))
        // Transfer endpoints
        .route(
            "/v1/batches/{id}/transfer",
            post(handlers::propose_transfer)
                .get(handlers::get_transfer)
                .delete(handlers::cancel_transfer),
        )
        .route(
            "/v1/batches/{id}/transfer/accept",
            post(handlers::accept_transfer),
        )
        // Scan and key endpoints
        .route("/v1/scan", post(handlers::scan))
        .route("/v1/keys/receipt", get(handlers::receipt_key))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
