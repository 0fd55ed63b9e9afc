//! Append rules
//!
//! The checks every append goes through, in the order the ledger applies
//! them: transition, role authorization, ownership, payload shape. Each check
//! is a pure function of its inputs so the ledger can run it under the batch
//! lock without touching storage.

use agrichain_core::{Actor, Address, BatchId, EventKind, EventPayload, Role, RolePolicy};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{LedgerError, Result};
use crate::registry::IdentityRegistry;

/// Reject `attempted` unless it is the allowed successor of `current`
pub fn validate_transition(
    batch_id: &BatchId,
    current: Option<EventKind>,
    attempted: EventKind,
) -> Result<()> {
    if attempted.allowed_after(current) {
        return Ok(());
    }

    warn!(
        batch_id = %batch_id,
        current = ?current,
        attempted = %attempted,
        "Rejected illegal transition"
    );
    Err(LedgerError::InvalidTransition {
        batch_id: batch_id.clone(),
        current,
        attempted: Some(attempted),
    })
}

/// Resolve `address` through the registry and check it may emit `kind` at `at`
///
/// Returns the registry's entry, which is what gets embedded in the event.
pub fn authorize_actor(
    registry: &dyn IdentityRegistry,
    policy: &RolePolicy,
    address: &Address,
    kind: EventKind,
    at: DateTime<Utc>,
) -> Result<Actor> {
    let actor = authorize_participant(registry, address, at)?;

    if !policy.permits(actor.role, kind) {
        warn!(
            actor = %address,
            role = %actor.role,
            kind = %kind,
            "Rejected append: role not permitted"
        );
        return Err(LedgerError::unauthorized(
            address,
            format!("role '{}' may not record '{}'", actor.role, kind),
        ));
    }

    Ok(actor)
}

/// Check that `address` is a known, currently valid, writing party
pub fn authorize_participant(
    registry: &dyn IdentityRegistry,
    address: &Address,
    at: DateTime<Utc>,
) -> Result<Actor> {
    let Some(actor) = registry.actor(address) else {
        warn!(actor = %address, "Rejected unknown actor");
        return Err(LedgerError::unauthorized(address, "unknown actor"));
    };

    if !actor.is_valid_at(at) {
        warn!(
            actor = %address,
            valid_from = %actor.valid_from,
            valid_until = ?actor.valid_until,
            "Rejected actor outside validity window"
        );
        return Err(LedgerError::unauthorized(address, "outside validity window"));
    }

    if actor.role == Role::Consumer {
        warn!(actor = %address, "Rejected consumer write");
        return Err(LedgerError::unauthorized(address, "consumers are read-only"));
    }

    Ok(actor)
}

/// Check custody for `kind`
///
/// Custody-taking kinds need the recipient of the most recent accepted
/// transfer. Continuation kinds (`InTransit`, `Sold`) need the current holder.
pub fn validate_custody(
    batch_id: &BatchId,
    kind: EventKind,
    address: &Address,
    holder: Option<&Address>,
    custodian: Option<&Address>,
) -> Result<()> {
    let (required, expected) = if kind.takes_custody() {
        (custodian, "the recipient of an accepted transfer")
    } else if matches!(kind, EventKind::InTransit | EventKind::Sold) {
        (holder, "the current holder")
    } else {
        return Ok(());
    };

    if required == Some(address) {
        return Ok(());
    }

    warn!(
        batch_id = %batch_id,
        actor = %address,
        kind = %kind,
        required = ?required,
        "Rejected append: custody not held"
    );
    Err(LedgerError::OwnershipMismatch {
        batch_id: batch_id.clone(),
        actor: address.clone(),
        expected: match required {
            Some(party) => format!("{} ({})", expected, party),
            None => format!("{} (none)", expected),
        },
    })
}

/// Reject a payload that does not belong on `kind`
pub fn validate_payload(batch_id: &BatchId, kind: EventKind, payload: &EventPayload) -> Result<()> {
    payload.ensure_fits(kind).map_err(|e| {
        warn!(batch_id = %batch_id, kind = %kind, payload = payload.name(), "Rejected payload");
        LedgerError::InvalidPayload {
            batch_id: batch_id.clone(),
            kind,
            reason: e.to_string(),
        }
    })
}
