//! Integration Tests for the AgriChain Ledger
//!
//! These tests drive the ledger the way the dashboard does:
//! - Batch creation by a farmer
//! - Custody handover through the transfer handshake
//! - Transport, listing and sale updates
//! - Verified lookup of the resulting history

use std::sync::Arc;

use agrichain_core::{
    Actor, Address, BatchId, EventKind, HarvestDetails, KeyPair, PricingDetails, Role,
    TransportDetails,
};
use agrichain_ledger::{Ledger, LedgerConfig, LedgerError, MemoryLog, MemoryRegistry};
use chrono::{Duration, NaiveDate, Utc};

// =============================================================================
// Test Helpers
// =============================================================================

const F1: &str = "0xf1000000000000000000000000000000000000f1";
const T1: &str = "0x7100000000000000000000000000000000000071";
const R1: &str = "0x8100000000000000000000000000000000000081";
const C1: &str = "0xc1000000000000000000000000000000000000c1";

fn addr(a: &str) -> Address {
    Address::new(a)
}

fn registry() -> MemoryRegistry {
    let since = Utc::now() - Duration::days(90);
    MemoryRegistry::from_actors([
        Actor::new(F1, Role::Farmer, since),
        Actor::new(T1, Role::Transporter, since),
        Actor::new(R1, Role::Retailer, since),
        Actor::new(C1, Role::Consumer, since),
    ])
}

fn create_ledger() -> Ledger {
    Ledger::new(
        LedgerConfig::default(),
        Arc::new(registry()),
        Arc::new(MemoryLog::new().with_signer(KeyPair::generate("ledger-test"))),
    )
}

fn harvest() -> HarvestDetails {
    HarvestDetails {
        crop: "Organic Tomatoes".into(),
        location: "Field A, Green Valley Farm".into(),
        harvest_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        quantity: 500,
        pesticide_usage: Some("None - Organic".into()),
    }
}

fn transport() -> TransportDetails {
    TransportDetails {
        vehicle_id: "TRUCK-001".into(),
        temperature: Some("2-4°C".into()),
        pickup_date: NaiveDate::from_ymd_opt(2024, 1, 16),
        delivery_date: None,
    }
}

fn pricing(cents: u64) -> PricingDetails {
    PricingDetails {
        price_cents: cents,
        currency: "USD".into(),
    }
}

fn b1() -> BatchId {
    BatchId::new("B1")
}

/// Hand custody from one party to another
async fn hand_over(ledger: &Ledger, from: &str, to: &str) {
    ledger
        .propose_transfer(&b1(), &addr(from), &addr(to))
        .await
        .expect("proposal should succeed");
    ledger
        .accept_transfer(&b1(), &addr(to))
        .await
        .expect("acceptance should succeed");
}

/// Run B1 through the whole lifecycle
async fn run_happy_path(ledger: &Ledger) {
    ledger.create(&addr(F1), Some(b1()), harvest()).await.unwrap();

    hand_over(ledger, F1, T1).await;
    ledger
        .record_transport(&addr(T1), &b1(), EventKind::PickedUp, transport())
        .await
        .unwrap();
    ledger
        .record_transport(&addr(T1), &b1(), EventKind::InTransit, transport())
        .await
        .unwrap();
    ledger
        .record_transport(&addr(T1), &b1(), EventKind::Delivered, transport())
        .await
        .unwrap();

    hand_over(ledger, T1, R1).await;
    ledger.list_for_sale(&addr(R1), &b1(), pricing(450)).await.unwrap();
    ledger.sell(&addr(R1), &b1(), pricing(450)).await.unwrap();
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[tokio::test]
async fn test_pickup_requires_role_then_custody() {
    let ledger = create_ledger();
    ledger.create(&addr(F1), Some(b1()), harvest()).await.unwrap();

    // Retailer cannot pick up at all
    let err = ledger
        .record_transport(&addr(R1), &b1(), EventKind::PickedUp, transport())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }), "got {:?}", err);

    // Transporter has the role but was never handed the batch
    let err = ledger
        .record_transport(&addr(T1), &b1(), EventKind::PickedUp, transport())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OwnershipMismatch { .. }), "got {:?}", err);

    hand_over(&ledger, F1, T1).await;
    let commit = ledger
        .record_transport(&addr(T1), &b1(), EventKind::PickedUp, transport())
        .await
        .unwrap();
    assert_eq!(commit.event.sequence, 1);

    let view = ledger.lookup(&b1()).await.unwrap();
    assert_eq!(view.current_holder, Some(addr(T1)));
    assert_eq!(view.stage, Some(EventKind::PickedUp));
}

#[tokio::test]
async fn test_full_lifecycle_verifies() {
    let ledger = create_ledger();
    run_happy_path(&ledger).await;

    let view = ledger.lookup(&b1()).await.unwrap();
    assert!(view.authentic);
    assert_eq!(view.events.len(), 6);
    assert_eq!(view.stage, Some(EventKind::Sold));
    assert_eq!(view.current_holder, Some(addr(R1)));

    let kinds: Vec<EventKind> = view.events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, EventKind::ALL.to_vec());

    for pair in view.events.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

#[tokio::test]
async fn test_nothing_follows_sold() {
    let ledger = create_ledger();
    run_happy_path(&ledger).await;

    for kind in EventKind::ALL {
        let err = ledger
            .record_transport(&addr(T1), &b1(), kind, transport())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }
    let err = ledger.sell(&addr(R1), &b1(), pricing(450)).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidTransition {
            current: Some(EventKind::Sold),
            ..
        }
    ));

    // No transfers of a sold batch either
    let err = ledger
        .propose_transfer(&b1(), &addr(R1), &addr(C1))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { attempted: None, .. }));
}

#[tokio::test]
async fn test_stage_skipping_rejected() {
    let ledger = create_ledger();
    ledger.create(&addr(F1), Some(b1()), harvest()).await.unwrap();
    hand_over(&ledger, F1, T1).await;

    for kind in [EventKind::InTransit, EventKind::Delivered] {
        let err = ledger
            .record_transport(&addr(T1), &b1(), kind, transport())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }
}

#[tokio::test]
async fn test_consumer_is_read_only() {
    let ledger = create_ledger();
    let err = ledger
        .create(&addr(C1), Some(b1()), harvest())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));

    ledger.create(&addr(F1), Some(b1()), harvest()).await.unwrap();
    // Reads need no role at all
    assert!(ledger.lookup(&b1()).await.unwrap().authentic);
}

#[tokio::test]
async fn test_unknown_batch() {
    let ledger = create_ledger();
    let missing = BatchId::new("BATCH404");

    assert!(matches!(ledger.lookup(&missing).await, Err(LedgerError::NotFound { .. })));
    assert!(matches!(
        ledger.propose_transfer(&missing, &addr(F1), &addr(T1)).await,
        Err(LedgerError::NotFound { .. })
    ));
    assert!(matches!(ledger.scan_code(&missing).await, Err(LedgerError::NotFound { .. })));
}

#[tokio::test]
async fn test_receipts_verify_against_ledger_key() {
    let ledger = create_ledger();
    let commit = ledger.create(&addr(F1), Some(b1()), harvest()).await.unwrap();

    let key = ledger.receipt_key().expect("log signs receipts");
    assert!(commit.receipt.verify(&key).is_ok());
    assert!(commit.receipt.claim().covers(&commit.event));
}

#[tokio::test]
async fn test_embedded_actor_comes_from_registry() {
    let ledger = create_ledger();
    let commit = ledger.create(&addr(F1), Some(b1()), harvest()).await.unwrap();

    assert_eq!(commit.event.actor.address, addr(F1));
    assert_eq!(commit.event.actor.role, Role::Farmer);
}

#[tokio::test]
async fn test_timeline_lists_custody_chain() {
    let ledger = create_ledger();
    run_happy_path(&ledger).await;

    let timeline = ledger.lookup(&b1()).await.unwrap().timeline();
    let parties: Vec<(Role, Address)> = timeline
        .iter()
        .map(|entry| (entry.role, entry.actor.clone()))
        .collect();
    assert_eq!(
        parties,
        vec![
            (Role::Farmer, addr(F1)),
            (Role::Transporter, addr(T1)),
            (Role::Transporter, addr(T1)),
            (Role::Transporter, addr(T1)),
            (Role::Retailer, addr(R1)),
            (Role::Retailer, addr(R1)),
        ]
    );
}

#[tokio::test]
async fn test_independent_batches() {
    let ledger = create_ledger();
    for id in ["BATCH001", "BATCH002", "BATCH003"] {
        ledger
            .create(&addr(F1), Some(BatchId::new(id)), harvest())
            .await
            .unwrap();
    }

    let batches = ledger.batches().await.unwrap();
    assert_eq!(batches.len(), 3);
    for id in batches {
        let view = ledger.lookup(&id).await.unwrap();
        assert_eq!(view.events.len(), 1);
        assert!(view.events[0].is_genesis());
    }
}
