//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::LedgerError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No session identity on the request
    #[error("Missing actor identity")]
    MissingIdentity,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MissingIdentity => StatusCode::UNAUTHORIZED,
            ApiError::Ledger(err) => match err {
                LedgerError::Unauthorized { .. } | LedgerError::OwnershipMismatch { .. } => {
                    StatusCode::FORBIDDEN
                }
                LedgerError::InvalidTransition { .. }
                | LedgerError::TransferAlreadyPending { .. }
                | LedgerError::ChainIntegrityFailure { .. } => StatusCode::CONFLICT,
                LedgerError::TransferExpired { .. } => StatusCode::GONE,
                LedgerError::NoSuchProposal { .. } | LedgerError::NotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                LedgerError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::DecodeError(_) => StatusCode::BAD_REQUEST,
                LedgerError::InvalidPayload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::Storage(_) | LedgerError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::MissingIdentity => "MISSING_IDENTITY",
            ApiError::Ledger(err) => err.code(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Ledger(LedgerError::InvalidTransition {
                current, attempted, ..
            }) => Some(serde_json::json!({
                "current": current,
                "attempted": attempted,
            })),
            ApiError::Ledger(LedgerError::ChainIntegrityFailure { sequence, .. }) => {
                Some(serde_json::json!({ "sequence": sequence }))
            }
            ApiError::Ledger(LedgerError::TransferExpired { expired_at, .. }) => {
                Some(serde_json::json!({ "expired_at": expired_at }))
            }
            ApiError::Ledger(LedgerError::TransferAlreadyPending { recipient, .. }) => {
                Some(serde_json::json!({ "recipient": recipient }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<agrichain_core::CoreError> for ApiError {
    fn from(err: agrichain_core::CoreError) -> Self {
        ApiError::Ledger(err.into())
    }
}
