//! Ownership Transfer Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use agrichain_core::{Address, BatchId};

use crate::api::error::ApiError;
use crate::api::handlers::AppState;
use crate::api::session::SessionActor;
use crate::ledger::TransferProposal;

/// Request to hand a batch to another party
#[derive(Debug, Deserialize)]
pub struct ProposeTransferRequest {
    pub to: Address,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    #[serde(flatten)]
    pub proposal: TransferProposal,

    /// `pending`, `accepted` or `cancelled`
    pub status: &'static str,
}

/// Propose a transfer to the named recipient
///
/// POST /v1/batches/{id}/transfer
pub async fn propose_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    SessionActor(actor): SessionActor,
    Json(request): Json<ProposeTransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    let proposal = state
        .ledger
        .propose_transfer(&BatchId::new(id), &actor, &request.to)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransferResponse {
            proposal,
            status: "pending",
        }),
    ))
}

/// Pending transfer of a batch
///
/// GET /v1/batches/{id}/transfer
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransferResponse>, ApiError> {
    let batch_id = BatchId::new(id);
    let proposal = state
        .ledger
        .pending_transfer(&batch_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No pending transfer for batch {}", batch_id)))?;

    Ok(Json(TransferResponse {
        proposal,
        status: "pending",
    }))
}

/// Accept the pending transfer as its recipient
///
/// POST /v1/batches/{id}/transfer/accept
pub async fn accept_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    SessionActor(actor): SessionActor,
) -> Result<Json<TransferResponse>, ApiError> {
    let proposal = state
        .ledger
        .accept_transfer(&BatchId::new(id), &actor)
        .await?;

    Ok(Json(TransferResponse {
        proposal,
        status: "accepted",
    }))
}

/// Withdraw the pending transfer as its proposer
///
/// DELETE /v1/batches/{id}/transfer
pub async fn cancel_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    SessionActor(actor): SessionActor,
) -> Result<Json<TransferResponse>, ApiError> {
    let proposal = state
        .ledger
        .cancel_transfer(&BatchId::new(id), &actor)
        .await?;

    Ok(Json(TransferResponse {
        proposal,
        status: "cancelled",
    }))
}
