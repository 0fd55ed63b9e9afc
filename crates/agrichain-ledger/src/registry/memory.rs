//! In-memory identity registry

use agrichain_core::{Actor, Address};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use super::IdentityRegistry;

/// Thread-safe registry of provisioned actors
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    actors: RwLock<HashMap<Address, Actor>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a provisioning list; later entries win
    pub fn from_actors(actors: impl IntoIterator<Item = Actor>) -> Self {
        let registry = Self::new();
        for actor in actors {
            registry.provision(actor);
        }
        registry
    }

    /// Add or replace an actor
    pub fn provision(&self, actor: Actor) {
        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            actor = %actor.address,
            role = %actor.role,
            valid_from = %actor.valid_from,
            valid_until = ?actor.valid_until,
            "Provisioned actor"
        );
        actors.insert(actor.address.clone(), actor);
    }

    /// Remove an actor
    pub fn revoke(&self, address: &Address) -> bool {
        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        let removed = actors.remove(address).is_some();
        if removed {
            info!(actor = %address, "Revoked actor");
        }
        removed
    }

    /// All provisioned actors, ordered by address
    pub fn list(&self) -> Vec<Actor> {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Actor> = actors.values().cloned().collect();
        list.sort_by(|a, b| a.address.cmp(&b.address));
        list
    }

    pub fn len(&self) -> usize {
        self.actors.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentityRegistry for MemoryRegistry {
    fn actor(&self, address: &Address) -> Option<Actor> {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner);
        actors.get(address).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrichain_core::Role;
    use chrono::{Duration, Utc};

    #[test]
    fn test_lookup() {
        let registry = MemoryRegistry::new();
        registry.provision(Actor::new("0xfarmer", Role::Farmer, Utc::now() - Duration::days(1)));

        assert_eq!(registry.role_of(&"0xfarmer".into()), Some(Role::Farmer));
        assert_eq!(registry.role_of(&"0xstranger".into()), None);
    }

    #[test]
    fn test_authorization_checks_role_and_window() {
        let now = Utc::now();
        let registry = MemoryRegistry::from_actors([
            Actor::new("0xfarmer", Role::Farmer, now - Duration::days(30)),
            Actor::new("0xseasonal", Role::Transporter, now - Duration::days(30))
                .valid_until(now - Duration::days(1)),
            Actor::new("0xfuture", Role::Retailer, now + Duration::days(1)),
        ]);

        assert!(registry.is_authorized(&"0xfarmer".into(), Role::Farmer, now));
        assert!(!registry.is_authorized(&"0xfarmer".into(), Role::Transporter, now));
        assert!(!registry.is_authorized(&"0xseasonal".into(), Role::Transporter, now));
        assert!(registry.is_authorized(
            &"0xseasonal".into(),
            Role::Transporter,
            now - Duration::days(2)
        ));
        assert!(!registry.is_authorized(&"0xfuture".into(), Role::Retailer, now));
        assert!(!registry.is_authorized(&"0xstranger".into(), Role::Farmer, now));
    }

    #[test]
    fn test_revoke_and_list() {
        let registry = MemoryRegistry::from_actors([
            Actor::new("0xb", Role::Retailer, Utc::now()),
            Actor::new("0xa", Role::Farmer, Utc::now()),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list()[0].address.as_str(), "0xa");

        assert!(registry.revoke(&"0xa".into()));
        assert!(!registry.revoke(&"0xa".into()));
        assert_eq!(registry.role_of(&"0xa".into()), None);
        assert_eq!(registry.len(), 1);
    }
}
