//! Identity & Role Registry
//!
//! Maps an actor address to the role it holds and the window in which it
//! holds it. The ledger only ever reads from the registry; provisioning is an
//! administrative concern handled outside ledger operations.

mod memory;

pub use memory::MemoryRegistry;

use agrichain_core::{Actor, Address, Role};
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Read-only view of who holds which role
pub trait IdentityRegistry: Send + Sync + Debug {
    /// Registry entry for an address, if known
    fn actor(&self, address: &Address) -> Option<Actor>;

    /// Role of an address; `None` means unknown
    fn role_of(&self, address: &Address) -> Option<Role> {
        self.actor(address).map(|actor| actor.role)
    }

    /// Check that `address` holds `role` and that its validity window covers `at`
    fn is_authorized(&self, address: &Address, role: Role, at: DateTime<Utc>) -> bool {
        matches!(self.actor(address), Some(actor) if actor.role == role && actor.is_valid_at(at))
    }
}
