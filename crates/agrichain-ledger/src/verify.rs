//! Verifier / Query Service
//!
//! Rebuilds a batch's view from stored history and decides whether that
//! history can be trusted. Verification never refuses to answer: a broken
//! chain still comes back in full, flagged as not authentic, with the first
//! offending sequence.
//!
//! Per event, in order:
//! 1. sequence equals position
//! 2. the event belongs to the batch being read
//! 3. the stored hash matches the recomputed seal
//! 4. `prev_hash` links to the previous event (zero digest at 0)
//! 5. the kind is a legal successor of the previous kind
//! 6. the embedded actor's role may record the kind and was valid at the event time
//! 7. timestamps never run backwards
//! 8. continuation kinds (`InTransit`, `Sold`) are recorded by the previous holder

use agrichain_core::{
    codec, Address, BatchEvent, BatchId, Digest, EventKind, Role, RolePolicy,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::error::{LedgerError, Result};
use crate::ledger::TransferProposal;
use crate::storage::ChainRead;

/// Why a chain failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    SequenceGap { found: u64 },
    ForeignEvent { batch_id: BatchId },
    HashMismatch { stored: Digest, computed: Digest },
    BrokenLink { expected: Digest, found: Digest },
    IllegalTransition { previous: Option<EventKind>, kind: EventKind },
    UnauthorizedActor { actor: Address, role: Role, kind: EventKind },
    TimestampRegression,
    CustodyBreak { holder: Address, actor: Address },
    Unreadable,
    /// A scanned code carries a different genesis event than the ledger
    ScanMismatch,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SequenceGap { found } => write!(f, "unexpected sequence {}", found),
            FailureReason::ForeignEvent { batch_id } => {
                write!(f, "event belongs to batch {}", batch_id)
            }
            FailureReason::HashMismatch { stored, computed } => {
                write!(f, "stored hash {} but fields hash to {}", stored, computed)
            }
            FailureReason::BrokenLink { expected, found } => {
                write!(f, "prev_hash {} does not link to {}", found, expected)
            }
            FailureReason::IllegalTransition { previous, kind } => match previous {
                Some(previous) => write!(f, "'{}' cannot follow '{}'", kind, previous),
                None => write!(f, "chain cannot open with '{}'", kind),
            },
            FailureReason::UnauthorizedActor { actor, role, kind } => {
                write!(f, "{} ({}) was not authorized to record '{}'", actor, role, kind)
            }
            FailureReason::TimestampRegression => f.write_str("timestamp runs backwards"),
            FailureReason::CustodyBreak { holder, actor } => {
                write!(f, "recorded by {} while {} held the batch", actor, holder)
            }
            FailureReason::Unreadable => f.write_str("stored record cannot be parsed"),
            FailureReason::ScanMismatch => {
                f.write_str("scanned code does not match the recorded created event")
            }
        }
    }
}

/// First failure found in a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityFailure {
    pub sequence: u64,
    pub reason: FailureReason,
}

/// One row of a custody timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub sequence: u64,
    pub kind: EventKind,
    pub actor: Address,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

/// Materialized state of a batch, rebuilt on every read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchView {
    pub batch_id: BatchId,
    /// Kind of the last recorded event
    pub stage: Option<EventKind>,
    /// Actor of the last recorded event
    pub current_holder: Option<Address>,
    pub events: Vec<BatchEvent>,
    pub authentic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<IntegrityFailure>,
    /// Best-effort: lookups never wait on the batch lock, so this reads
    /// `None` while another operation on the batch is in progress. Use
    /// `Ledger::pending_transfer` for an authoritative answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transfer: Option<TransferProposal>,
}

impl BatchView {
    /// Turn a verification failure into an error
    pub fn ensure_authentic(&self) -> Result<()> {
        match &self.failure {
            None => Ok(()),
            Some(failure) => Err(LedgerError::ChainIntegrityFailure {
                batch_id: self.batch_id.clone(),
                sequence: failure.sequence,
                reason: failure.reason.to_string(),
            }),
        }
    }

    /// Custody timeline for display
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        self.events
            .iter()
            .map(|event| TimelineEntry {
                sequence: event.sequence,
                kind: event.kind,
                actor: event.actor.address.clone(),
                role: event.actor.role,
                timestamp: event.timestamp,
            })
            .collect()
    }

    /// Record a failure unless an earlier one is already known
    pub(crate) fn flag(&mut self, failure: IntegrityFailure) {
        let earlier = matches!(&self.failure, Some(known) if known.sequence <= failure.sequence);
        if !earlier {
            self.failure = Some(failure);
            self.authentic = false;
        }
    }
}

/// Replays stored chains against the chain rules and a role policy
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    policy: RolePolicy,
}

impl Verifier {
    pub fn new(policy: RolePolicy) -> Self {
        Self { policy }
    }

    /// Decode and verify one scanned record without any ledger state
    pub fn verify_event(bytes: &[u8]) -> Result<BatchEvent> {
        codec::decode(bytes).map_err(LedgerError::from)
    }

    /// Verify a stored chain and build its view
    pub fn verify_chain(&self, batch_id: &BatchId, chain: ChainRead) -> BatchView {
        let failure = self.first_failure(batch_id, &chain);

        if let Some(failure) = &failure {
            warn!(
                batch_id = %batch_id,
                sequence = failure.sequence,
                reason = %failure.reason,
                "Chain failed verification"
            );
        }

        let last = chain.events.last();
        BatchView {
            batch_id: batch_id.clone(),
            stage: last.map(|e| e.kind),
            current_holder: last.map(|e| e.actor.address.clone()),
            authentic: failure.is_none(),
            failure,
            events: chain.events,
            pending_transfer: None,
        }
    }

    fn first_failure(&self, batch_id: &BatchId, chain: &ChainRead) -> Option<IntegrityFailure> {
        let mut previous: Option<&BatchEvent> = None;

        for (position, event) in chain.events.iter().enumerate() {
            let position = position as u64;
            if let Some(reason) = self.check_event(batch_id, position, event, previous) {
                return Some(IntegrityFailure {
                    sequence: position,
                    reason,
                });
            }
            previous = Some(event);
        }

        chain.unreadable_at.map(|sequence| IntegrityFailure {
            sequence,
            reason: FailureReason::Unreadable,
        })
    }

    fn check_event(
        &self,
        batch_id: &BatchId,
        position: u64,
        event: &BatchEvent,
        previous: Option<&BatchEvent>,
    ) -> Option<FailureReason> {
        if event.sequence != position {
            return Some(FailureReason::SequenceGap {
                found: event.sequence,
            });
        }

        if &event.batch_id != batch_id {
            return Some(FailureReason::ForeignEvent {
                batch_id: event.batch_id.clone(),
            });
        }

        match event.compute_hash() {
            Ok(computed) if computed == event.hash => {}
            Ok(computed) => {
                return Some(FailureReason::HashMismatch {
                    stored: event.hash,
                    computed,
                })
            }
            Err(_) => return Some(FailureReason::Unreadable),
        }

        let expected = previous.map(|p| p.hash).unwrap_or(Digest::ZERO);
        if event.prev_hash != expected {
            return Some(FailureReason::BrokenLink {
                expected,
                found: event.prev_hash,
            });
        }

        let previous_kind = previous.map(|p| p.kind);
        if !event.kind.allowed_after(previous_kind) {
            return Some(FailureReason::IllegalTransition {
                previous: previous_kind,
                kind: event.kind,
            });
        }

        if !self.policy.permits(event.actor.role, event.kind)
            || !event.actor.is_valid_at(event.timestamp)
        {
            return Some(FailureReason::UnauthorizedActor {
                actor: event.actor.address.clone(),
                role: event.actor.role,
                kind: event.kind,
            });
        }

        let Some(previous) = previous else {
            return None;
        };

        if event.timestamp < previous.timestamp {
            return Some(FailureReason::TimestampRegression);
        }

        if matches!(event.kind, EventKind::InTransit | EventKind::Sold)
            && event.actor.address != previous.actor.address
        {
            return Some(FailureReason::CustodyBreak {
                holder: previous.actor.address.clone(),
                actor: event.actor.address.clone(),
            });
        }

        None
    }
}
