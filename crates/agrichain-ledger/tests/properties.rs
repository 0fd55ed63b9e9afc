//! Property-Based Tests for Ledger Operations
//!
//! Arbitrary sequences of transfer handshakes and appends, made by arbitrary
//! parties, must never leave a batch chain that:
//! 1. LINKAGE: skips a sequence or breaks a `prev_hash` link
//! 2. ORDER: departs from the lifecycle path
//! 3. AUTHORITY: holds an event its actor's role may not record
//!
//! and only a successful append may grow the chain.

use std::sync::Arc;

use agrichain_core::{
    Actor, Address, BatchId, EventKind, EventPayload, HarvestDetails, PricingDetails, Role,
    RolePolicy, TransportDetails,
};
use agrichain_ledger::{Ledger, LedgerConfig, MemoryLog, MemoryRegistry};
use chrono::{Duration, NaiveDate, Utc};
use proptest::prelude::*;

// =============================================================================
// Parties and Steps
// =============================================================================

const PARTIES: [(&str, Role); 5] = [
    ("0xf1000000000000000000000000000000000000f1", Role::Farmer),
    ("0x7100000000000000000000000000000000000071", Role::Transporter),
    ("0x7200000000000000000000000000000000000072", Role::Transporter),
    ("0x8100000000000000000000000000000000000081", Role::Retailer),
    ("0xc1000000000000000000000000000000000000c1", Role::Consumer),
];

fn party(index: usize) -> Address {
    Address::new(PARTIES[index].0)
}

#[derive(Debug, Clone)]
enum Step {
    Propose { from: usize, to: usize },
    Accept { by: usize },
    Cancel { by: usize },
    Record { kind: EventKind, by: usize },
}

fn party_strategy() -> impl Strategy<Value = usize> {
    0..PARTIES.len()
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => (party_strategy(), party_strategy()).prop_map(|(from, to)| Step::Propose { from, to }),
        1 => party_strategy().prop_map(|by| Step::Accept { by }),
        1 => party_strategy().prop_map(|by| Step::Cancel { by }),
        3 => (proptest::sample::select(EventKind::ALL.to_vec()), party_strategy())
            .prop_map(|(kind, by)| Step::Record { kind, by }),
    ]
}

fn payload_for(kind: EventKind) -> EventPayload {
    match kind {
        EventKind::Created => EventPayload::Harvest(HarvestDetails {
            crop: "Organic Tomatoes".into(),
            location: "Field A".into(),
            harvest_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            quantity: 500,
            pesticide_usage: None,
        }),
        EventKind::PickedUp | EventKind::InTransit | EventKind::Delivered => {
            EventPayload::Transport(TransportDetails {
                vehicle_id: "TRUCK-001".into(),
                temperature: None,
                pickup_date: None,
                delivery_date: None,
            })
        }
        EventKind::Listed | EventKind::Sold => EventPayload::Pricing(PricingDetails {
            price_cents: 450,
            currency: "USD".into(),
        }),
    }
}

fn ledger() -> Ledger {
    let since = Utc::now() - Duration::days(90);
    let registry = MemoryRegistry::from_actors(
        PARTIES
            .iter()
            .map(|(address, role)| Actor::new(*address, *role, since)),
    );
    Ledger::new(
        LedgerConfig::default(),
        Arc::new(registry),
        Arc::new(MemoryLog::new()),
    )
}

/// Run the steps, checking the stored chain after each one
///
/// Returns the final chain length.
async fn run(steps: Vec<Step>) -> Result<usize, TestCaseError> {
    let ledger = ledger();
    let batch = BatchId::new("B1");
    let policy = RolePolicy::default();
    let mut length = 0;

    for step in steps {
        let before = ledger.lookup(&batch).await.map_or(0, |view| view.events.len());

        let appended = match &step {
            Step::Propose { from, to } => {
                let _ = ledger.propose_transfer(&batch, &party(*from), &party(*to)).await;
                false
            }
            Step::Accept { by } => {
                let _ = ledger.accept_transfer(&batch, &party(*by)).await;
                false
            }
            Step::Cancel { by } => {
                let _ = ledger.cancel_transfer(&batch, &party(*by)).await;
                false
            }
            Step::Record { kind, by } => ledger
                .append(&batch, *kind, &party(*by), payload_for(*kind))
                .await
                .is_ok(),
        };

        let Ok(view) = ledger.lookup(&batch).await else {
            prop_assert!(!appended, "append accepted but nothing stored");
            continue;
        };
        length = view.events.len();
        prop_assert_eq!(length, before + usize::from(appended), "after {:?}", step);

        prop_assert!(view.authentic, "{:?} after {:?}", view.failure, step);
        for (position, event) in view.events.iter().enumerate() {
            prop_assert_eq!(event.sequence, position as u64);
            prop_assert_eq!(event.kind, EventKind::ALL[position]);
            prop_assert!(policy.permits(event.actor.role, event.kind));
        }
        for pair in view.events.windows(2) {
            prop_assert!(pair[1].follows(&pair[0]));
        }
    }
    Ok(length)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_any_interleaving_keeps_chain_valid(
        steps in proptest::collection::vec(step_strategy(), 1..60),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(steps))?;
    }
}

// =============================================================================
// Fixed Interleaving
// =============================================================================

#[tokio::test]
async fn test_full_lifecycle_through_step_runner() {
    let steps = vec![
        Step::Record { kind: EventKind::Created, by: 0 },
        Step::Propose { from: 0, to: 1 },
        Step::Accept { by: 2 },
        Step::Accept { by: 1 },
        Step::Record { kind: EventKind::PickedUp, by: 2 },
        Step::Record { kind: EventKind::PickedUp, by: 1 },
        Step::Record { kind: EventKind::InTransit, by: 1 },
        Step::Record { kind: EventKind::Delivered, by: 1 },
        Step::Propose { from: 1, to: 3 },
        Step::Accept { by: 3 },
        Step::Record { kind: EventKind::Sold, by: 3 },
        Step::Record { kind: EventKind::Listed, by: 3 },
        Step::Record { kind: EventKind::Sold, by: 4 },
        Step::Record { kind: EventKind::Sold, by: 3 },
    ];
    assert_eq!(run(steps).await.unwrap(), EventKind::ALL.len());
}
