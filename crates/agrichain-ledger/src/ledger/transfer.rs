//! Ownership Transfer Protocol
//!
//! Two-step handshake layered over `append`. The current holder proposes a
//! recipient; the recipient accepts, which makes it the custodian of record
//! and unlocks the next custody-taking event. Proposals are pending state on
//! the batch slot, never chain events, and at most one is live per batch.

use agrichain_core::{Address, BatchId, EventKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::Ledger;
use crate::core::authorize_participant;
use crate::error::{LedgerError, Result};

/// A custody handover awaiting the recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferProposal {
    pub batch_id: BatchId,
    pub from: Address,
    pub to: Address,
    /// Batch stage when the proposal was made
    pub stage: EventKind,
    pub proposed_at: DateTime<Utc>,
    /// Open-ended when no deadline is configured for `stage`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TransferProposal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

impl Ledger {
    /// Current holder offers custody to `to`
    pub async fn propose_transfer(
        &self,
        batch_id: &BatchId,
        from: &Address,
        to: &Address,
    ) -> Result<TransferProposal> {
        let mut slot = self.lock(batch_id, false).await?;

        let Some(stage) = slot.stage() else {
            return Err(LedgerError::NotFound {
                batch_id: batch_id.clone(),
            });
        };
        if stage.is_terminal() {
            warn!(batch_id = %batch_id, "Rejected transfer of a sold batch");
            return Err(LedgerError::InvalidTransition {
                batch_id: batch_id.clone(),
                current: Some(stage),
                attempted: None,
            });
        }

        let now = Utc::now();
        authorize_participant(self.registry.as_ref(), from, now)?;

        if slot.holder.as_ref() != Some(from) {
            warn!(batch_id = %batch_id, actor = %from, holder = ?slot.holder, "Rejected transfer by non-holder");
            return Err(LedgerError::OwnershipMismatch {
                batch_id: batch_id.clone(),
                actor: from.clone(),
                expected: match &slot.holder {
                    Some(holder) => format!("the current holder ({})", holder),
                    None => "the current holder (none)".into(),
                },
            });
        }

        authorize_participant(self.registry.as_ref(), to, now)?;
        if to == from {
            return Err(LedgerError::unauthorized(to, "already holds the batch"));
        }

        if let Some(pending) = &slot.pending {
            if !pending.is_expired(now) {
                warn!(batch_id = %batch_id, recipient = %pending.to, "Rejected second proposal");
                return Err(LedgerError::TransferAlreadyPending {
                    batch_id: batch_id.clone(),
                    recipient: pending.to.clone(),
                });
            }
            info!(batch_id = %batch_id, recipient = %pending.to, "Replacing expired proposal");
        }

        let proposal = TransferProposal {
            batch_id: batch_id.clone(),
            from: from.clone(),
            to: to.clone(),
            stage,
            proposed_at: now,
            expires_at: self
                .config
                .transfer_policy
                .deadline_for(stage)
                .map(|deadline| now + deadline),
        };
        slot.pending = Some(proposal.clone());

        info!(
            batch_id = %batch_id,
            from = %from,
            to = %to,
            stage = %stage,
            expires_at = ?proposal.expires_at,
            "Proposed transfer"
        );
        Ok(proposal)
    }

    /// Named recipient takes custody of record
    pub async fn accept_transfer(&self, batch_id: &BatchId, by: &Address) -> Result<TransferProposal> {
        let mut slot = self.lock(batch_id, false).await?;

        if slot.stage().is_none() {
            return Err(LedgerError::NotFound {
                batch_id: batch_id.clone(),
            });
        }
        let Some(pending) = slot.pending.clone() else {
            return Err(LedgerError::NoSuchProposal {
                batch_id: batch_id.clone(),
            });
        };

        if &pending.to != by {
            warn!(batch_id = %batch_id, actor = %by, recipient = %pending.to, "Rejected acceptance by non-recipient");
            return Err(LedgerError::unauthorized(by, "not the named recipient"));
        }

        let now = Utc::now();
        if let Some(expired_at) = pending.expires_at.filter(|_| pending.is_expired(now)) {
            slot.pending = None;
            warn!(batch_id = %batch_id, recipient = %by, expired_at = %expired_at, "Proposal expired");
            return Err(LedgerError::TransferExpired {
                batch_id: batch_id.clone(),
                expired_at,
            });
        }

        authorize_participant(self.registry.as_ref(), by, now)?;

        slot.pending = None;
        slot.custodian = Some(by.clone());

        info!(batch_id = %batch_id, from = %pending.from, to = %by, "Accepted transfer");
        Ok(pending)
    }

    /// Proposer withdraws a pending proposal
    pub async fn cancel_transfer(&self, batch_id: &BatchId, by: &Address) -> Result<TransferProposal> {
        let mut slot = self.lock(batch_id, false).await?;

        let Some(pending) = slot.pending.clone() else {
            return Err(LedgerError::NoSuchProposal {
                batch_id: batch_id.clone(),
            });
        };
        if &pending.from != by {
            return Err(LedgerError::unauthorized(by, "only the proposer can cancel"));
        }

        slot.pending = None;
        info!(batch_id = %batch_id, by = %by, "Cancelled transfer");
        Ok(pending)
    }

    /// Live proposal on a batch, if any
    pub async fn pending_transfer(&self, batch_id: &BatchId) -> Result<Option<TransferProposal>> {
        let slot = self.lock(batch_id, false).await?;
        if slot.stage().is_none() {
            return Err(LedgerError::NotFound {
                batch_id: batch_id.clone(),
            });
        }
        let now = Utc::now();
        Ok(slot.pending.clone().filter(|p| !p.is_expired(now)))
    }
}
