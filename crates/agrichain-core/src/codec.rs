//! Record Codec
//!
//! Canonical, self-describing encoding of batch events. The same bytes are
//! hashed for chaining, appended to durable logs and embedded in scannable
//! codes, so a downstream verifier needs nothing but this module.
//!
//! The encoding is compact JSON with a fixed field order:
//!
//! ```text
//! {"v":1,"batch_id":..,"sequence":..,"kind":..,"actor":{..},"payload":{..},
//!  "prev_hash":..,"timestamp":..,"hash":..}
//! ```
//!
//! `hash` is SHA-256 over the same encoding with the `hash` field omitted.
//! `decode` accepts only bytes that `encode` would have produced.

use crate::error::{CoreError, Result};
use crate::event::{BatchEvent, EventPayload};
use crate::lifecycle::EventKind;
use crate::types::{Actor, BatchId, Digest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Version tag written as the first field of every record
pub const FORMAT_VERSION: u32 = 1;

/// Fields covered by the seal
#[derive(Serialize)]
struct Unsealed<'a> {
    v: u32,
    batch_id: &'a BatchId,
    sequence: u64,
    kind: EventKind,
    actor: &'a Actor,
    payload: &'a EventPayload,
    prev_hash: &'a Digest,
    timestamp: &'a DateTime<Utc>,
}

#[derive(Serialize)]
struct Sealed<'a> {
    v: u32,
    batch_id: &'a BatchId,
    sequence: u64,
    kind: EventKind,
    actor: &'a Actor,
    payload: &'a EventPayload,
    prev_hash: &'a Digest,
    timestamp: &'a DateTime<Utc>,
    hash: &'a Digest,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Record {
    v: u32,
    batch_id: BatchId,
    sequence: u64,
    kind: EventKind,
    actor: Actor,
    payload: EventPayload,
    prev_hash: Digest,
    timestamp: DateTime<Utc>,
    hash: Digest,
}

#[derive(Deserialize)]
struct VersionProbe {
    v: u32,
}

/// Encode an event canonically
pub fn encode(event: &BatchEvent) -> Result<Vec<u8>> {
    let sealed = Sealed {
        v: FORMAT_VERSION,
        batch_id: &event.batch_id,
        sequence: event.sequence,
        kind: event.kind,
        actor: &event.actor,
        payload: &event.payload,
        prev_hash: &event.prev_hash,
        timestamp: &event.timestamp,
        hash: &event.hash,
    };
    serde_json::to_vec(&sealed).map_err(CoreError::from)
}

/// Compute the seal of an event: SHA-256 over its canonical encoding minus `hash`
pub fn hash(event: &BatchEvent) -> Result<Digest> {
    let unsealed = Unsealed {
        v: FORMAT_VERSION,
        batch_id: &event.batch_id,
        sequence: event.sequence,
        kind: event.kind,
        actor: &event.actor,
        payload: &event.payload,
        prev_hash: &event.prev_hash,
        timestamp: &event.timestamp,
    };
    let bytes = serde_json::to_vec(&unsealed)?;
    Ok(Digest::from_bytes(Sha256::digest(&bytes).into()))
}

/// Decode canonical bytes into an event
///
/// Fails unless the bytes carry a known version, parse completely, are
/// byte-identical to the canonical re-encoding, and carry a hash that matches
/// the recomputed seal. Never returns a partially populated event.
pub fn decode(bytes: &[u8]) -> Result<BatchEvent> {
    let event = decode_unverified(bytes)?;

    if encode(&event)? != bytes {
        return Err(CoreError::NonCanonical);
    }

    let computed = hash(&event)?;
    if computed != event.hash {
        return Err(CoreError::HashMismatch {
            stored: event.hash.to_hex(),
            computed: computed.to_hex(),
        });
    }

    Ok(event)
}

/// Parse a record without checking canonical form or the seal
///
/// Used by stores that must surface tampered records to the verifier rather
/// than hide them. Anything read this way must still go through verification
/// before it is trusted.
pub fn decode_unverified(bytes: &[u8]) -> Result<BatchEvent> {
    let probe: VersionProbe =
        serde_json::from_slice(bytes).map_err(|e| CoreError::Decode(e.to_string()))?;
    if probe.v != FORMAT_VERSION {
        return Err(CoreError::UnsupportedVersion(probe.v));
    }

    let record: Record =
        serde_json::from_slice(bytes).map_err(|e| CoreError::Decode(e.to_string()))?;

    Ok(BatchEvent {
        batch_id: record.batch_id,
        sequence: record.sequence,
        kind: record.kind,
        actor: record.actor,
        payload: record.payload,
        prev_hash: record.prev_hash,
        timestamp: record.timestamp,
        hash: record.hash,
    })
}
