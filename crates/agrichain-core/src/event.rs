//! Batch events
//!
//! A `BatchEvent` is the atomic, immutable unit of a batch's history. Each
//! event is sealed exactly once by `EventBuilder`, which fixes:
//!
//! 1. **Position**: sequence 0 for `Created`, predecessor.sequence + 1 otherwise
//! 2. **Link**: `prev_hash` is the predecessor's `hash` (or the zero digest)
//! 3. **Seal**: `hash` covers every other field of the canonical encoding
//!
//! Nothing ever rewrites an event after it is sealed.

use crate::codec;
use crate::error::{CoreError, Result};
use crate::lifecycle::EventKind;
use crate::types::{Actor, BatchId, Digest};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Harvest metadata recorded by the farmer when the batch is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestDetails {
    /// Crop name (e.g. "Organic Tomatoes")
    pub crop: String,

    /// Field / farm the batch was harvested from
    pub location: String,

    pub harvest_date: NaiveDate,

    /// Quantity in the farm's unit of record
    pub quantity: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pesticide_usage: Option<String>,
}

/// Transport metadata recorded on pickup, in transit and on delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDetails {
    pub vehicle_id: String,

    /// Cold-chain temperature band, free-form (e.g. "2-4°C")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
}

/// Retail pricing, in integral minor units of `currency`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingDetails {
    pub price_cents: u64,

    /// ISO 4217 code
    pub currency: String,
}

/// Kind-specific metadata carried by an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Harvest(HarvestDetails),
    Transport(TransportDetails),
    Pricing(PricingDetails),
}

impl EventPayload {
    /// Check whether this payload belongs on an event of `kind`
    pub fn fits(&self, kind: EventKind) -> bool {
        match self {
            EventPayload::Harvest(_) => kind == EventKind::Created,
            EventPayload::Transport(_) => matches!(
                kind,
                EventKind::PickedUp | EventKind::InTransit | EventKind::Delivered
            ),
            EventPayload::Pricing(_) => matches!(kind, EventKind::Listed | EventKind::Sold),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::Harvest(_) => "harvest",
            EventPayload::Transport(_) => "transport",
            EventPayload::Pricing(_) => "pricing",
        }
    }

    /// Reject a payload that does not belong on `kind`
    pub fn ensure_fits(&self, kind: EventKind) -> Result<()> {
        if self.fits(kind) {
            Ok(())
        } else {
            Err(CoreError::PayloadMismatch {
                kind: kind.to_string(),
                payload: self.name().to_string(),
            })
        }
    }
}

/// One sealed entry of a batch's hash chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEvent {
    pub batch_id: BatchId,

    /// Position in the batch chain, contiguous from 0
    pub sequence: u64,

    pub kind: EventKind,

    /// Party asserting this event, as attested by the registry at append time
    pub actor: Actor,

    pub payload: EventPayload,

    /// `hash` of the previous event, or `Digest::ZERO` at sequence 0
    pub prev_hash: Digest,

    /// Non-decreasing within a chain
    pub timestamp: DateTime<Utc>,

    /// Seal over all other fields
    pub hash: Digest,
}

impl BatchEvent {
    /// Recompute the seal from the event's fields
    pub fn compute_hash(&self) -> Result<Digest> {
        codec::hash(self)
    }

    /// Check that the stored seal matches the fields
    pub fn seal_is_intact(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    /// Check whether `self` links directly onto `predecessor`
    pub fn follows(&self, predecessor: &BatchEvent) -> bool {
        self.batch_id == predecessor.batch_id
            && self.sequence == predecessor.sequence + 1
            && self.prev_hash == predecessor.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.sequence == 0 && self.prev_hash.is_zero()
    }

    /// Canonical encoding of this event
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Decode and verify canonical bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}

/// Builder that seals new events
///
/// # Example
///
/// ```ignore
/// let created = EventBuilder::new(EventKind::Created)
///     .actor(farmer)
///     .payload(EventPayload::Harvest(details))
///     .build_genesis(BatchId::generate())?;
///
/// let picked_up = EventBuilder::new(EventKind::PickedUp)
///     .actor(transporter)
///     .payload(EventPayload::Transport(transport))
///     .build_successor(&created)?;
/// ```
#[derive(Debug)]
pub struct EventBuilder {
    kind: EventKind,
    actor: Option<Actor>,
    payload: Option<EventPayload>,
    timestamp: Option<DateTime<Utc>>,
}

impl EventBuilder {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            actor: None,
            payload: None,
            timestamp: None,
        }
    }

    pub fn actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the event time (defaults to now)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Seal the first event of a new batch chain
    pub fn build_genesis(self, batch_id: BatchId) -> Result<BatchEvent> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        self.seal(batch_id, 0, Digest::ZERO, timestamp)
    }

    /// Seal an event that links onto `predecessor`
    ///
    /// The batch id, sequence and `prev_hash` are always taken from the
    /// predecessor, and the timestamp is clamped so it never runs backwards.
    pub fn build_successor(self, predecessor: &BatchEvent) -> Result<BatchEvent> {
        let requested = self.timestamp.unwrap_or_else(Utc::now);
        let timestamp = requested.max(predecessor.timestamp);
        self.seal(
            predecessor.batch_id.clone(),
            predecessor.sequence + 1,
            predecessor.hash,
            timestamp,
        )
    }

    /// Seal at an explicit chain position
    pub fn build_at(
        self,
        batch_id: BatchId,
        sequence: u64,
        prev_hash: Digest,
    ) -> Result<BatchEvent> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        self.seal(batch_id, sequence, prev_hash, timestamp)
    }

    fn seal(
        self,
        batch_id: BatchId,
        sequence: u64,
        prev_hash: Digest,
        timestamp: DateTime<Utc>,
    ) -> Result<BatchEvent> {
        let actor = self.actor.ok_or(CoreError::MissingField("actor".into()))?;
        let payload = self.payload.ok_or(CoreError::MissingField("payload".into()))?;
        payload.ensure_fits(self.kind)?;

        let mut event = BatchEvent {
            batch_id,
            sequence,
            kind: self.kind,
            actor,
            payload,
            prev_hash,
            timestamp,
            hash: Digest::ZERO,
        };
        event.hash = codec::hash(&event)?;
        Ok(event)
    }
}
