//! AgriChain Ledger
//!
//! The provenance ledger service for harvested produce batches:
//! - Records each batch's custody chain from harvest to sale
//! - Enforces the lifecycle state machine and role authorization on every append
//! - Runs the two-step ownership transfer handshake between custodians
//! - Replays and verifies any batch's history for consumers and auditors
//!
//! ## Chain Rules
//!
//! 1. **Lifecycle**: Created -> PickedUp -> InTransit -> Delivered -> Listed -> Sold
//! 2. **Authorization**: the registry attests the role; the role policy says what it may record
//! 3. **Custody**: PickedUp, Delivered and Listed need an accepted transfer
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with batch count and receipt kid
//! - `GET /v1/batches` - List batch ids
//! - `POST /v1/batches` - Create a batch (farmer)
//! - `GET /v1/batches/{id}` - Verified batch view and timeline
//! - `POST /v1/batches/{id}/transport` - Pickup / in transit / delivery (transporter)
//! - `POST /v1/batches/{id}/listing` - List for sale (retailer)
//! - `POST /v1/batches/{id}/sale` - Record sale (retailer)
//! - `GET /v1/batches/{id}/code` - Scannable code text
//! - `POST /v1/batches/{id}/transfer` - Propose a custody transfer
//! - `GET /v1/batches/{id}/transfer` - Pending transfer
//! - `DELETE /v1/batches/{id}/transfer` - Cancel a pending transfer
//! - `POST /v1/batches/{id}/transfer/accept` - Accept a custody transfer
//! - `POST /v1/scan` - Resolve and verify a scanned code
//! - `GET /v1/keys/receipt` - Receipt verification key

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod storage;
pub mod verify;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{ConfigError, LedgerConfig, ServerConfig, TransferPolicy};
pub use error::{LedgerError, Result};
pub use ledger::{Commit, Ledger, TransferProposal};
pub use registry::{IdentityRegistry, MemoryRegistry};
pub use storage::{ChainRead, EventLog, FileLog, MemoryLog, Receipt, StorageError};
pub use verify::{BatchView, FailureReason, IntegrityFailure, TimelineEntry, Verifier};
