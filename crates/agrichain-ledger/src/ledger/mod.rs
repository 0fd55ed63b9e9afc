//! Provenance Ledger
//!
//! Owns the per-batch state and is the only way history changes. Every write
//! for a batch runs under that batch's lock, so sequence assignment and
//! `prev_hash` linkage cannot race; different batches never contend.
//!
//! An append goes through, in order:
//! 1. **Transition**: `kind` must be the allowed successor of the last kind
//! 2. **Authorization**: the registry must attest a role that may record `kind`
//! 3. **Ownership**: custody-taking kinds need an accepted transfer,
//!    continuation kinds need the current holder
//! 4. **Payload**: the metadata shape must belong to `kind`
//!
//! and is then sealed, submitted to the injected log and becomes irrevocable.

mod slot;
mod transfer;

pub use transfer::TransferProposal;

use agrichain_core::{
    Address, BatchEvent, BatchId, EventBuilder, EventKind, EventPayload, HarvestDetails, PricingDetails,
    PublicKey, ScanCode, TransportDetails,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::core::{authorize_actor, validate_custody, validate_payload, validate_transition};
use crate::error::{LedgerError, Result};
use crate::registry::IdentityRegistry;
use crate::storage::{EventLog, Receipt};
use crate::verify::{BatchView, FailureReason, IntegrityFailure, Verifier};
use slot::BatchSlot;

/// A committed event and the log's receipt for it
#[derive(Debug, Clone, Serialize)]
pub struct Commit {
    pub event: BatchEvent,
    pub receipt: Receipt,
}

/// The process-wide ledger
#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    registry: Arc<dyn IdentityRegistry>,
    log: Arc<dyn EventLog>,
    verifier: Verifier,
    slots: RwLock<HashMap<BatchId, Arc<Mutex<BatchSlot>>>>,
}

impl Ledger {
    pub fn new(
        config: LedgerConfig,
        registry: Arc<dyn IdentityRegistry>,
        log: Arc<dyn EventLog>,
    ) -> Self {
        let verifier = Verifier::new(config.role_policy.clone());
        Self {
            config,
            registry,
            log,
            verifier,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Key that verifies commit receipts, if the log signs them
    pub fn receipt_key(&self) -> Option<PublicKey> {
        self.log.receipt_key()
    }

    /// Shared slot of a batch
    ///
    /// A slot is only opened for a batch with stored history, or when
    /// `opening` a new one; otherwise `None` and nothing is inserted.
    async fn slot(&self, batch_id: &BatchId, opening: bool) -> Result<Option<Arc<Mutex<BatchSlot>>>> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(batch_id)
        {
            return Ok(Some(slot.clone()));
        }

        if !opening && self.log.read_chain(batch_id).await?.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            self.slots
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(batch_id.clone())
                .or_default()
                .clone(),
        ))
    }

    /// Take the batch lock, waiting at most the configured timeout
    ///
    /// Unless `opening`, a batch without history is `NotFound`. Dropping the
    /// returned future before it resolves leaves no trace.
    pub(crate) async fn lock(
        &self,
        batch_id: &BatchId,
        opening: bool,
    ) -> Result<OwnedMutexGuard<BatchSlot>> {
        let not_found = || LedgerError::NotFound {
            batch_id: batch_id.clone(),
        };
        let slot = self.slot(batch_id, opening).await?.ok_or_else(not_found)?;
        let waited = self.config.lock_timeout;

        let mut guard = match tokio::time::timeout(waited, slot.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(batch_id = %batch_id, waited_ms = waited.as_millis() as u64, "Batch lock timed out");
                return Err(LedgerError::Busy {
                    batch_id: batch_id.clone(),
                    waited,
                });
            }
        };
        debug!(batch_id = %batch_id, "Acquired batch lock");

        if !guard.hydrated {
            let chain = match self.log.read_chain(batch_id).await {
                Ok(chain) => chain,
                Err(e) => {
                    self.release(batch_id, guard);
                    return Err(e.into());
                }
            };
            guard.hydrate(&chain);
            debug!(
                batch_id = %batch_id,
                events = chain.events.len(),
                unreadable_at = ?chain.unreadable_at,
                "Hydrated batch state"
            );
        }

        if !opening && guard.is_vacant() {
            self.release(batch_id, guard);
            return Err(not_found());
        }

        Ok(guard)
    }

    /// Unlock, dropping the slot from the map if it holds nothing
    ///
    /// A slot that another caller has cloned or is queued on stays, so two
    /// slots never exist for one batch.
    pub(crate) fn release(&self, batch_id: &BatchId, guard: OwnedMutexGuard<BatchSlot>) {
        if guard.is_vacant() {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let owned = OwnedMutexGuard::mutex(&guard);
            // Held only by the map and this guard
            let unshared = slots
                .get(batch_id)
                .is_some_and(|slot| Arc::ptr_eq(slot, owned) && Arc::strong_count(slot) == 2);
            if unshared {
                slots.remove(batch_id);
                debug!(batch_id = %batch_id, "Evicted empty batch slot");
            }
        }
        drop(guard);
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Append one event to a batch chain
    pub async fn append(
        &self,
        batch_id: &BatchId,
        kind: EventKind,
        actor: &Address,
        payload: EventPayload,
    ) -> Result<Commit> {
        let mut slot = match self.lock(batch_id, kind == EventKind::Created).await {
            Err(LedgerError::NotFound { .. }) => {
                // Nothing recorded yet: only `Created` may come first
                validate_transition(batch_id, None, kind)?;
                return Err(LedgerError::NotFound {
                    batch_id: batch_id.clone(),
                });
            }
            locked => locked?,
        };

        match self.append_locked(&mut slot, batch_id, kind, actor, payload).await {
            Ok(commit) => Ok(commit),
            Err(e) => {
                self.release(batch_id, slot);
                Err(e)
            }
        }
    }

    async fn append_locked(
        &self,
        slot: &mut BatchSlot,
        batch_id: &BatchId,
        kind: EventKind,
        actor: &Address,
        payload: EventPayload,
    ) -> Result<Commit> {
        if let Some(sequence) = slot.unreadable_at {
            warn!(batch_id = %batch_id, sequence, "Refusing append onto unreadable chain");
            return Err(LedgerError::ChainIntegrityFailure {
                batch_id: batch_id.clone(),
                sequence,
                reason: FailureReason::Unreadable.to_string(),
            });
        }

        validate_transition(batch_id, slot.stage(), kind)?;

        let now = Utc::now();
        let at = slot
            .last
            .as_ref()
            .map_or(now, |last| now.max(last.timestamp));

        let attested = authorize_actor(
            self.registry.as_ref(),
            &self.config.role_policy,
            actor,
            kind,
            at,
        )?;
        validate_custody(
            batch_id,
            kind,
            actor,
            slot.holder.as_ref(),
            slot.custodian.as_ref(),
        )?;
        validate_payload(batch_id, kind, &payload)?;

        let builder = EventBuilder::new(kind)
            .actor(attested)
            .payload(payload)
            .timestamp(at);
        let event = match &slot.last {
            Some(last) => builder.build_successor(last)?,
            None => builder.build_genesis(batch_id.clone())?,
        };

        // Re-read from the log if this future is dropped mid-submit
        slot.hydrated = false;
        let receipt = self.log.submit(&event).await?;
        slot.record(&event);

        info!(
            batch_id = %batch_id,
            sequence = event.sequence,
            kind = %kind,
            actor = %actor,
            hash = %event.hash,
            "Appended event"
        );

        Ok(Commit { event, receipt })
    }

    /// Create a batch from the farmer's harvest record
    pub async fn create(
        &self,
        farmer: &Address,
        batch_id: Option<BatchId>,
        harvest: HarvestDetails,
    ) -> Result<Commit> {
        let batch_id = batch_id.unwrap_or_else(BatchId::generate);
        self.append(
            &batch_id,
            EventKind::Created,
            farmer,
            EventPayload::Harvest(harvest),
        )
        .await
    }

    /// Record a pickup, in-transit or delivery update
    pub async fn record_transport(
        &self,
        transporter: &Address,
        batch_id: &BatchId,
        kind: EventKind,
        details: TransportDetails,
    ) -> Result<Commit> {
        self.append(batch_id, kind, transporter, EventPayload::Transport(details))
            .await
    }

    /// List a delivered batch for sale
    pub async fn list_for_sale(
        &self,
        retailer: &Address,
        batch_id: &BatchId,
        pricing: PricingDetails,
    ) -> Result<Commit> {
        self.append(
            batch_id,
            EventKind::Listed,
            retailer,
            EventPayload::Pricing(pricing),
        )
        .await
    }

    /// Record the final sale
    pub async fn sell(
        &self,
        retailer: &Address,
        batch_id: &BatchId,
        pricing: PricingDetails,
    ) -> Result<Commit> {
        self.append(batch_id, EventKind::Sold, retailer, EventPayload::Pricing(pricing))
            .await
    }

    /// Known batch ids
    pub async fn batches(&self) -> Result<Vec<BatchId>> {
        Ok(self.log.batch_ids().await?)
    }

    /// Replay and verify a batch's stored history
    ///
    /// Reads the committed prefix of the log without taking the batch lock.
    pub async fn lookup(&self, batch_id: &BatchId) -> Result<BatchView> {
        let chain = self.log.read_chain(batch_id).await?;
        if chain.is_empty() {
            return Err(LedgerError::NotFound {
                batch_id: batch_id.clone(),
            });
        }

        let mut view = self.verifier.verify_chain(batch_id, chain);
        view.pending_transfer = self.peek_pending(batch_id);
        Ok(view)
    }

    /// Pending proposal if the batch is not mid-operation
    ///
    /// Never waits: a held batch lock reads as no proposal.
    fn peek_pending(&self, batch_id: &BatchId) -> Option<TransferProposal> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(batch_id)?
            .clone();
        let guard = slot.try_lock().ok()?;
        let now = Utc::now();
        guard.pending.clone().filter(|p| !p.is_expired(now))
    }

    /// Resolve scanned code text to a verified view
    ///
    /// A code that embeds the created event is checked against the
    /// recorded one; a mismatch marks the view as not authentic.
    pub async fn resolve_scan(&self, text: &str) -> Result<BatchView> {
        let code = ScanCode::parse(text)?;
        let mut view = self.lookup(code.batch_id()).await?;

        if let ScanCode::Event(scanned) = &code {
            if view.events.first() != Some(scanned) {
                view.flag(IntegrityFailure {
                    sequence: 0,
                    reason: FailureReason::ScanMismatch,
                });
            }
        }
        Ok(view)
    }

    /// Scannable code embedding a batch's created event
    pub async fn scan_code(&self, batch_id: &BatchId) -> Result<ScanCode> {
        let events = self.log.events(batch_id).await?;
        let created = events.first().ok_or_else(|| LedgerError::NotFound {
            batch_id: batch_id.clone(),
        })?;
        Ok(ScanCode::for_created(created)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::storage::MemoryLog;
    use agrichain_core::{Actor, Role};
    use chrono::{Duration, NaiveDate};

    fn ledger() -> Ledger {
        let since = Utc::now() - Duration::days(30);
        let registry = MemoryRegistry::from_actors([
            Actor::new("0xfarmer", Role::Farmer, since),
            Actor::new("0xtruck", Role::Transporter, since),
        ]);
        Ledger::new(
            LedgerConfig::default(),
            Arc::new(registry),
            Arc::new(MemoryLog::new()),
        )
    }

    fn harvest() -> HarvestDetails {
        HarvestDetails {
            crop: "Sweet Corn".into(),
            location: "Field B".into(),
            harvest_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            quantity: 750,
            pesticide_usage: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_genesis() {
        let ledger = ledger();
        let commit = ledger
            .create(&"0xfarmer".into(), Some(BatchId::new("BATCH002")), harvest())
            .await
            .unwrap();

        assert!(commit.event.is_genesis());
        assert_eq!(commit.receipt.hash, commit.event.hash);
        assert_eq!(ledger.batches().await.unwrap(), vec![BatchId::new("BATCH002")]);
    }

    #[tokio::test]
    async fn test_generated_batch_id() {
        let ledger = ledger();
        let commit = ledger.create(&"0xfarmer".into(), None, harvest()).await.unwrap();
        assert!(commit.event.batch_id.as_str().starts_with("BATCH-"));
    }

    #[tokio::test]
    async fn test_create_twice_rejected() {
        let ledger = ledger();
        let id = BatchId::new("BATCH002");
        ledger.create(&"0xfarmer".into(), Some(id.clone()), harvest()).await.unwrap();

        let err = ledger
            .create(&"0xfarmer".into(), Some(id), harvest())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_rules_applied_in_order() {
        let ledger = ledger();
        let id = BatchId::new("BATCH002");

        // No batch yet: transition fails before the unknown actor is looked at
        let err = ledger
            .append(&id, EventKind::PickedUp, &"0xnobody".into(), EventPayload::Harvest(harvest()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");

        // Legal transition, wrong payload: authorization passes, payload fails
        let err = ledger
            .append(
                &id,
                EventKind::Created,
                &"0xfarmer".into(),
                EventPayload::Pricing(PricingDetails {
                    price_cents: 100,
                    currency: "USD".into(),
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
        assert!(matches!(ledger.lookup(&id).await, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_rejected_calls_on_unknown_batches_keep_no_slot() {
        let ledger = ledger();
        let farmer: Address = "0xfarmer".into();
        let truck: Address = "0xtruck".into();

        for i in 0..200 {
            let id = BatchId::new(format!("GHOST-{}", i));
            assert!(ledger.pending_transfer(&id).await.is_err());
            assert!(ledger.propose_transfer(&id, &farmer, &truck).await.is_err());
            assert!(ledger.accept_transfer(&id, &truck).await.is_err());
            assert!(ledger.cancel_transfer(&id, &farmer).await.is_err());
            assert!(ledger
                .append(&id, EventKind::Sold, &farmer, EventPayload::Harvest(harvest()))
                .await
                .is_err());

            // Rejected creations release the slot they opened
            assert!(ledger.create(&"0xnobody".into(), Some(id.clone()), harvest()).await.is_err());
            assert!(ledger
                .append(
                    &id,
                    EventKind::Created,
                    &farmer,
                    EventPayload::Pricing(PricingDetails {
                        price_cents: 100,
                        currency: "USD".into(),
                    }),
                )
                .await
                .is_err());
        }
        assert_eq!(ledger.slot_count(), 0);

        let err = ledger.pending_transfer(&BatchId::new("GHOST-0")).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        ledger.create(&farmer, Some(BatchId::new("BATCH002")), harvest()).await.unwrap();
        assert_eq!(ledger.slot_count(), 1);
    }

    #[tokio::test]
    async fn test_lookup_does_not_wait_for_busy_batch() {
        let ledger = ledger();
        let id = BatchId::new("BATCH002");
        let farmer: Address = "0xfarmer".into();
        ledger.create(&farmer, Some(id.clone()), harvest()).await.unwrap();
        ledger.propose_transfer(&id, &farmer, &"0xtruck".into()).await.unwrap();

        let held = ledger.lock(&id, false).await.unwrap();
        let view = tokio::time::timeout(std::time::Duration::from_millis(500), ledger.lookup(&id))
            .await
            .expect("lookup should not block on the batch lock")
            .unwrap();
        assert_eq!(view.pending_transfer, None);
        drop(held);

        let view = ledger.lookup(&id).await.unwrap();
        assert_eq!(view.pending_transfer.unwrap().to, Address::from("0xtruck"));
    }

    #[tokio::test]
    async fn test_scan_code_roundtrip() {
        let ledger = ledger();
        let id = BatchId::new("BATCH002");
        ledger.create(&"0xfarmer".into(), Some(id.clone()), harvest()).await.unwrap();

        let text = ledger.scan_code(&id).await.unwrap().to_text().unwrap();
        let view = ledger.resolve_scan(&text).await.unwrap();
        assert!(view.authentic);
        assert_eq!(view.events.len(), 1);

        let reference = ScanCode::reference(id).to_text().unwrap();
        assert!(ledger.resolve_scan(&reference).await.unwrap().authentic);

        let err = ledger.resolve_scan("agrichain:v1:e:AAAA").await.unwrap_err();
        assert_eq!(err.code(), "DECODE_ERROR");
    }
}
