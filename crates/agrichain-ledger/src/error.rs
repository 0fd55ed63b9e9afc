//! Ledger error taxonomy
//!
//! Every rejection the ledger can produce. All of them are returned to the
//! caller as typed results; the ledger never retries and never swallows one.

use agrichain_core::{Address, BatchId, CoreError, EventKind};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::storage::StorageError;

/// Result type alias using LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors returned by ledger, transfer and query operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Actor is unknown, outside its validity window, or its role may not do this
    #[error("Unauthorized: {actor}: {reason}")]
    Unauthorized { actor: Address, reason: String },

    /// State-machine violation
    #[error("Invalid transition for batch {batch_id}: {} -> {}", stage_name(.current), attempted_name(.attempted))]
    InvalidTransition {
        batch_id: BatchId,
        current: Option<EventKind>,
        /// `None` when the attempted step is a custody transfer
        attempted: Option<EventKind>,
    },

    /// Actor does not hold custody required for this step
    #[error("Ownership mismatch on batch {batch_id}: {actor} is not {expected}")]
    OwnershipMismatch {
        batch_id: BatchId,
        actor: Address,
        /// Who the ledger expected (custodian of record or current holder)
        expected: String,
    },

    #[error("Transfer of batch {batch_id} to {recipient} is already pending")]
    TransferAlreadyPending { batch_id: BatchId, recipient: Address },

    #[error("Transfer of batch {batch_id} expired at {expired_at}")]
    TransferExpired {
        batch_id: BatchId,
        expired_at: DateTime<Utc>,
    },

    #[error("No pending transfer for batch {batch_id}")]
    NoSuchProposal { batch_id: BatchId },

    /// Verification found a tampered or broken link; reported, never repaired
    #[error("Chain integrity failure in batch {batch_id} at sequence {sequence}: {reason}")]
    ChainIntegrityFailure {
        batch_id: BatchId,
        sequence: u64,
        reason: String,
    },

    /// Per-batch lock not acquired within the configured timeout
    #[error("Batch {batch_id} is busy (waited {waited:?})")]
    Busy { batch_id: BatchId, waited: Duration },

    #[error("Batch {batch_id} not found")]
    NotFound { batch_id: BatchId },

    /// Malformed scanned payload or record bytes
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Payload shape does not belong to the event kind
    #[error("Invalid payload for {kind} on batch {batch_id}: {reason}")]
    InvalidPayload {
        batch_id: BatchId,
        kind: EventKind,
        reason: String,
    },

    /// Backing log failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn stage_name(stage: &Option<EventKind>) -> String {
    stage.map(|k| k.to_string()).unwrap_or_else(|| "(none)".into())
}

fn attempted_name(attempted: &Option<EventKind>) -> String {
    attempted
        .map(|k| k.to_string())
        .unwrap_or_else(|| "custody transfer".into())
}

impl LedgerError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Unauthorized { .. } => "UNAUTHORIZED",
            LedgerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LedgerError::OwnershipMismatch { .. } => "OWNERSHIP_MISMATCH",
            LedgerError::TransferAlreadyPending { .. } => "TRANSFER_ALREADY_PENDING",
            LedgerError::TransferExpired { .. } => "TRANSFER_EXPIRED",
            LedgerError::NoSuchProposal { .. } => "NO_SUCH_PROPOSAL",
            LedgerError::ChainIntegrityFailure { .. } => "CHAIN_INTEGRITY_FAILURE",
            LedgerError::Busy { .. } => "BUSY",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::DecodeError(_) => "DECODE_ERROR",
            LedgerError::InvalidPayload { .. } => "INVALID_PAYLOAD",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn unauthorized(actor: &Address, reason: impl Into<String>) -> Self {
        LedgerError::Unauthorized {
            actor: actor.clone(),
            reason: reason.into(),
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Decode(_)
            | CoreError::UnsupportedVersion(_)
            | CoreError::NonCanonical
            | CoreError::HashMismatch { .. } => LedgerError::DecodeError(err.to_string()),
            other => LedgerError::Internal(other.to_string()),
        }
    }
}
