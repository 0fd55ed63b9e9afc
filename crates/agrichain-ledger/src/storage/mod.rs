//! Storage abstraction for the ledger
//!
//! The ledger treats its backing store as an opaque `submit(event) -> receipt`
//! dependency injected at construction. Two backends ship with the crate:
//! - `MemoryLog`: in-process, lost on restart
//! - `FileLog`: one JSON-lines file per batch, each line a canonical record
//!
//! `key_file` keeps the receipt signing key across restarts.
//!
//! A backend only stores and returns what it is given. Deciding what may be
//! appended is the ledger's job; deciding whether stored history can be
//! trusted is the verifier's.

pub mod file;
pub mod key_file;
pub mod memory;

pub use file::FileLog;
pub use memory::MemoryLog;

use agrichain_core::{
    BatchEvent, BatchId, CoreError, Digest, KeyPair, PublicKey, ReceiptClaim, SignedReceipt,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Submitted event is not at the next free position of its chain
    #[error("Sequence conflict on batch {batch_id}: expected {expected}, got {got}")]
    Conflict {
        batch_id: BatchId,
        expected: u64,
        got: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signing error: {0}")]
    Signing(String),
}

/// Proof that an event was committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub batch_id: BatchId,
    pub sequence: u64,
    pub hash: Digest,
    pub committed_at: DateTime<Utc>,

    /// Base64 COSE_Sign1 over the claim, when the backend holds a signing key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Receipt {
    /// Issue a receipt for a committed event, signing it if a key is given
    pub fn issue(event: &BatchEvent, signer: Option<&KeyPair>) -> Result<Self, StorageError> {
        let committed_at = Utc::now();
        let claim = ReceiptClaim::for_event(event, committed_at);

        let signature = match signer {
            Some(key) => {
                let signed = key
                    .sign_receipt(&claim)
                    .map_err(|e| StorageError::Signing(e.to_string()))?;
                let bytes = signed
                    .to_bytes()
                    .map_err(|e| StorageError::Signing(e.to_string()))?;
                Some(STANDARD.encode(bytes))
            }
            None => None,
        };

        Ok(Self {
            batch_id: claim.batch_id,
            sequence: claim.sequence,
            hash: claim.hash,
            committed_at,
            signature,
        })
    }

    pub fn claim(&self) -> ReceiptClaim {
        ReceiptClaim {
            batch_id: self.batch_id.clone(),
            sequence: self.sequence,
            hash: self.hash,
            committed_at: self.committed_at,
        }
    }

    /// Check the signature against the ledger's public key
    pub fn verify(&self, key: &PublicKey) -> Result<(), CoreError> {
        let encoded = self
            .signature
            .as_ref()
            .ok_or(CoreError::MissingField("signature".into()))?;
        let signed = SignedReceipt::from_bytes(&STANDARD.decode(encoded)?)?;
        let claim = key.verify_receipt(&signed)?;
        if claim != self.claim() {
            return Err(CoreError::Crypto("receipt claim does not match receipt".into()));
        }
        Ok(())
    }
}

/// Result of reading one batch chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainRead {
    /// Readable prefix of the chain, in stored order
    pub events: Vec<BatchEvent>,

    /// Position of the first stored record that could not be parsed
    pub unreadable_at: Option<u64>,
}

impl ChainRead {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.unreadable_at.is_none()
    }
}

/// Append-only event log backing the ledger
///
/// Implementations must be thread-safe and must only ever expose fully
/// committed records.
#[async_trait]
pub trait EventLog: Send + Sync + Debug {
    /// Append an event to its batch chain
    ///
    /// Refuses an event whose sequence is not exactly the chain's length.
    async fn submit(&self, event: &BatchEvent) -> Result<Receipt, StorageError>;

    /// Read a batch chain in stored order
    async fn read_chain(&self, batch_id: &BatchId) -> Result<ChainRead, StorageError>;

    /// Readable events of a batch chain
    async fn events(&self, batch_id: &BatchId) -> Result<Vec<BatchEvent>, StorageError> {
        Ok(self.read_chain(batch_id).await?.events)
    }

    /// All batches with at least one stored record
    async fn batch_ids(&self) -> Result<Vec<BatchId>, StorageError>;

    /// Number of stored batches
    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.batch_ids().await?.len())
    }

    /// Key that verifies this log's receipts, if it signs them
    fn receipt_key(&self) -> Option<PublicKey>;
}
