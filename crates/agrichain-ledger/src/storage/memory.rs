//! In-memory event log
//!
//! Default backend for development and tests. Data is lost on restart.

use agrichain_core::{BatchEvent, BatchId, KeyPair, PublicKey};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChainRead, EventLog, Receipt, StorageError};

/// In-memory event log
#[derive(Debug, Default)]
pub struct MemoryLog {
    chains: RwLock<HashMap<BatchId, Vec<BatchEvent>>>,
    signer: Option<KeyPair>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign every receipt with `key`
    pub fn with_signer(mut self, key: KeyPair) -> Self {
        self.signer = Some(key);
        self
    }

    /// Seed the log with previously exported history
    ///
    /// Records are stored as given, in order, without any checks, so an
    /// import of damaged history is surfaced by the verifier later.
    pub fn with_history(events: impl IntoIterator<Item = BatchEvent>) -> Self {
        let mut chains: HashMap<BatchId, Vec<BatchEvent>> = HashMap::new();
        for event in events {
            chains.entry(event.batch_id.clone()).or_default().push(event);
        }
        Self {
            chains: RwLock::new(chains),
            signer: None,
        }
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn submit(&self, event: &BatchEvent) -> Result<Receipt, StorageError> {
        let mut chains = self.chains.write().await;
        let chain = chains.entry(event.batch_id.clone()).or_default();

        let expected = chain.len() as u64;
        if event.sequence != expected {
            return Err(StorageError::Conflict {
                batch_id: event.batch_id.clone(),
                expected,
                got: event.sequence,
            });
        }

        let receipt = Receipt::issue(event, self.signer.as_ref())?;
        chain.push(event.clone());
        debug!(batch_id = %event.batch_id, sequence = event.sequence, "Stored event");
        Ok(receipt)
    }

    async fn read_chain(&self, batch_id: &BatchId) -> Result<ChainRead, StorageError> {
        let chains = self.chains.read().await;
        Ok(ChainRead {
            events: chains.get(batch_id).cloned().unwrap_or_default(),
            unreadable_at: None,
        })
    }

    async fn batch_ids(&self) -> Result<Vec<BatchId>, StorageError> {
        let chains = self.chains.read().await;
        let mut ids: Vec<BatchId> = chains
            .iter()
            .filter(|(_, chain)| !chain.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn receipt_key(&self) -> Option<PublicKey> {
        self.signer.as_ref().map(KeyPair::public_key)
    }
}
