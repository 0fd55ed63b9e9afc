//! Receipt Key Handler
//!
//! Publishes the key that verifies commit receipts.

use axum::{extract::State, Json};
use std::sync::Arc;

use agrichain_core::crypto::SerializablePublicKey;

use crate::api::error::ApiError;
use crate::api::handlers::AppState;

/// Receipt verification key
///
/// GET /v1/keys/receipt
pub async fn receipt_key(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SerializablePublicKey>, ApiError> {
    let key = state
        .ledger
        .receipt_key()
        .ok_or_else(|| ApiError::NotFound("This ledger does not sign receipts".into()))?;
    Ok(Json((&key).into()))
}
