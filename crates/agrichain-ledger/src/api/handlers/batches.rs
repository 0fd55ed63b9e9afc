//! Batch Handlers
//!
//! Farmer, transporter and retailer forms each map onto one ledger append.
//! The acting address comes from the session; the role from the registry.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use agrichain_core::{
    BatchId, Digest, EventKind, HarvestDetails, PricingDetails, ScanCode, TransportDetails,
};

use crate::api::error::ApiError;
use crate::api::handlers::AppState;
use crate::api::session::SessionActor;
use crate::ledger::Commit;
use crate::storage::Receipt;
use crate::verify::{BatchView, TimelineEntry};

/// Farmer upload form
#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    /// Caller-chosen id; generated when absent
    #[serde(default)]
    pub batch_id: Option<String>,

    #[serde(flatten)]
    pub harvest: HarvestDetails,
}

/// Transporter update form
#[derive(Debug, Deserialize)]
pub struct TransportRequest {
    /// `picked_up`, `in_transit` or `delivered`
    pub kind: EventKind,

    #[serde(flatten)]
    pub details: TransportDetails,
}

/// A committed event as returned to the caller
#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub batch_id: BatchId,
    pub sequence: u64,
    pub kind: EventKind,
    pub hash: Digest,
    pub timestamp: DateTime<Utc>,
    pub receipt: Receipt,
}

impl From<Commit> for CommitResponse {
    fn from(commit: Commit) -> Self {
        Self {
            batch_id: commit.event.batch_id,
            sequence: commit.event.sequence,
            kind: commit.event.kind,
            hash: commit.event.hash,
            timestamp: commit.event.timestamp,
            receipt: commit.receipt,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateBatchResponse {
    #[serde(flatten)]
    pub commit: CommitResponse,

    /// Text to embed in the batch's QR code
    pub scan_code: String,
}

#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub batches: Vec<BatchId>,
    pub count: usize,
}

/// Verified batch view plus its custody timeline
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    #[serde(flatten)]
    pub view: BatchView,
    pub timeline: Vec<TimelineEntry>,
}

impl From<BatchView> for BatchResponse {
    fn from(view: BatchView) -> Self {
        let timeline = view.timeline();
        Self { view, timeline }
    }
}

#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub batch_id: BatchId,
    pub code: String,
}

/// List known batch ids
///
/// GET /v1/batches
pub async fn list_batches(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListBatchesResponse>, ApiError> {
    let batches = state.ledger.batches().await?;
    let count = batches.len();
    Ok(Json(ListBatchesResponse { batches, count }))
}

/// Create a batch
///
/// POST /v1/batches
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    SessionActor(actor): SessionActor,
    Json(request): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<CreateBatchResponse>), ApiError> {
    let batch_id = match request.batch_id {
        Some(id) if id.trim().is_empty() => {
            return Err(ApiError::BadRequest("Batch id cannot be empty".into()))
        }
        Some(id) if id.len() > 128 => {
            return Err(ApiError::BadRequest("Batch id too long (max 128 chars)".into()))
        }
        Some(id) => Some(BatchId::new(id.trim())),
        None => None,
    };
    if request.harvest.crop.trim().is_empty() {
        return Err(ApiError::BadRequest("Crop name cannot be empty".into()));
    }

    let commit = state.ledger.create(&actor, batch_id, request.harvest).await?;
    let scan_code = ScanCode::for_created(&commit.event)?.to_text()?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBatchResponse {
            commit: commit.into(),
            scan_code,
        }),
    ))
}

/// Verified view of a batch
///
/// GET /v1/batches/{id}
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchResponse>, ApiError> {
    let view = state.ledger.lookup(&BatchId::new(id)).await?;
    Ok(Json(view.into()))
}

/// Record a transport update
///
/// POST /v1/batches/{id}/transport
pub async fn record_transport(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    SessionActor(actor): SessionActor,
    Json(request): Json<TransportRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    if request.details.vehicle_id.trim().is_empty() {
        return Err(ApiError::BadRequest("Vehicle id cannot be empty".into()));
    }
    let commit = state
        .ledger
        .record_transport(&actor, &BatchId::new(id), request.kind, request.details)
        .await?;
    Ok(Json(commit.into()))
}

/// List a batch for sale
///
/// POST /v1/batches/{id}/listing
pub async fn list_for_sale(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    SessionActor(actor): SessionActor,
    Json(pricing): Json<PricingDetails>,
) -> Result<Json<CommitResponse>, ApiError> {
    let commit = state
        .ledger
        .list_for_sale(&actor, &BatchId::new(id), pricing)
        .await?;
    Ok(Json(commit.into()))
}

/// Record the sale of a batch
///
/// POST /v1/batches/{id}/sale
pub async fn sell(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    SessionActor(actor): SessionActor,
    Json(pricing): Json<PricingDetails>,
) -> Result<Json<CommitResponse>, ApiError> {
    let commit = state.ledger.sell(&actor, &BatchId::new(id), pricing).await?;
    Ok(Json(commit.into()))
}

/// Scannable code for a batch's created event
///
/// GET /v1/batches/{id}/code
pub async fn batch_code(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CodeResponse>, ApiError> {
    let batch_id = BatchId::new(id);
    let code = state.ledger.scan_code(&batch_id).await?.to_text()?;
    Ok(Json(CodeResponse { batch_id, code }))
}
