//! API request handlers

pub mod batches;
pub mod keys;
pub mod scan;
pub mod transfer;

use std::sync::Arc;

use crate::ledger::Ledger;

pub use batches::{
    batch_code, create_batch, get_batch, list_batches, list_for_sale, record_transport, sell,
    BatchResponse, CodeResponse, CommitResponse, CreateBatchRequest, CreateBatchResponse,
    ListBatchesResponse, TransportRequest,
};
pub use keys::receipt_key;
pub use scan::{scan, ScanRequest};
pub use transfer::{
    accept_transfer, cancel_transfer, get_transfer, propose_transfer, ProposeTransferRequest,
    TransferResponse,
};

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}
