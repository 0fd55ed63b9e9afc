//! Per-batch state held under the batch lock

use agrichain_core::{Address, BatchEvent, EventKind};

use super::TransferProposal;
use crate::storage::ChainRead;

/// Everything the ledger needs to decide the next append for one batch
///
/// Derived from the stored chain, except for transfer state which lives only
/// here.
#[derive(Debug, Default)]
pub(crate) struct BatchSlot {
    /// Tail of the chain
    pub last: Option<BatchEvent>,
    /// Actor of the most recent event
    pub holder: Option<Address>,
    /// Recipient of the most recent accepted transfer
    pub custodian: Option<Address>,
    pub pending: Option<TransferProposal>,
    /// Position of an unparseable stored record; appends are refused past it
    pub unreadable_at: Option<u64>,
    /// False until read from the log, and while a submit is in flight
    pub hydrated: bool,
}

impl BatchSlot {
    pub fn stage(&self) -> Option<EventKind> {
        self.last.as_ref().map(|event| event.kind)
    }

    /// Holds nothing worth keeping: no history seen and no proposal
    pub fn is_vacant(&self) -> bool {
        self.last.is_none() && self.pending.is_none() && self.unreadable_at.is_none()
    }

    /// Rebuild chain-derived state from stored history
    ///
    /// Transfer state already held survives. Without it, the custodian is
    /// the actor of the last custody-taking event, who must have held an
    /// accepted transfer at the time.
    pub fn hydrate(&mut self, chain: &ChainRead) {
        let derived_custodian = chain
            .events
            .iter()
            .rev()
            .find(|event| event.kind.takes_custody())
            .map(|event| event.actor.address.clone());

        self.last = chain.events.last().cloned();
        self.holder = self.last.as_ref().map(|event| event.actor.address.clone());
        self.custodian = self.custodian.take().or(derived_custodian);
        self.unreadable_at = chain.unreadable_at;
        self.hydrated = true;
    }

    /// Advance past a committed event
    pub fn record(&mut self, event: &BatchEvent) {
        self.holder = Some(event.actor.address.clone());
        if event.kind.is_terminal() {
            self.pending = None;
        }
        self.last = Some(event.clone());
        self.hydrated = true;
    }
}
