//! # AgriChain Core
//!
//! Event model, canonical codec and receipt signing for the AgriChain batch
//! provenance ledger. Nothing in this crate performs I/O, so a downstream
//! verifier (a consumer scanning a QR code, an auditor replaying an export)
//! can depend on it without the ledger service.
//!
//! ## Key Concepts
//!
//! - **BatchEvent**: one sealed, immutable entry of a batch's custody chain
//! - **Lifecycle**: Created -> PickedUp -> InTransit -> Delivered -> Listed -> Sold
//! - **RolePolicy**: which role may emit which event kind
//! - **Codec**: canonical bytes, SHA-256 seal, strict decode
//! - **Receipt**: Ed25519 COSE_Sign1 attestation that an event was committed
//!
//! ## Chain Invariants
//!
//! 1. **Position**: sequences are contiguous from 0 within a batch
//! 2. **Link**: `prev_hash(n) == hash(n - 1)`, zero digest at sequence 0
//! 3. **Seal**: `hash` is a pure function of the other fields and never changes

pub mod codec;
pub mod crypto;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod scan;
pub mod types;

pub use crypto::{KeyPair, PublicKey, ReceiptClaim, SignedReceipt};
pub use error::{CoreError, Result};
pub use event::{
    BatchEvent, EventBuilder, EventPayload, HarvestDetails, PricingDetails, TransportDetails,
};
pub use lifecycle::{EventKind, RolePolicy};
pub use scan::ScanCode;
pub use types::{Actor, Address, BatchId, Digest, Role};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
