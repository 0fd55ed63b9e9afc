//! Scan-and-verify handler backing the consumer QR feature

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::handlers::batches::BatchResponse;
use crate::api::handlers::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Text read from the code
    pub code: String,
}

/// Resolve a scanned code to a verified batch view
///
/// POST /v1/scan
///
/// Needs no session: consumers are read-only callers.
pub async fn scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    if request.code.len() > 16 * 1024 {
        return Err(ApiError::BadRequest("Code too long".into()));
    }
    let view = state.ledger.resolve_scan(&request.code).await?;
    Ok(Json(view.into()))
}
