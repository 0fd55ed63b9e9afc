//! Batch lifecycle state machine and role policy
//!
//! Every batch walks one fixed path:
//!
//! ```text
//! Created -> PickedUp -> InTransit -> Delivered -> Listed -> Sold
//! ```
//!
//! `Sold` is terminal. The role policy decides which role may emit which
//! kind; the default table is Farmer -> Created, Transporter -> PickedUp /
//! InTransit / Delivered, Retailer -> Listed / Sold. Consumers never emit
//! events, whatever the table says.

use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind of a batch event, which doubles as the lifecycle stage it leads to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    PickedUp,
    InTransit,
    Delivered,
    Listed,
    Sold,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Created,
        EventKind::PickedUp,
        EventKind::InTransit,
        EventKind::Delivered,
        EventKind::Listed,
        EventKind::Sold,
    ];

    /// The single kind that may follow this one, if any
    pub fn successor(&self) -> Option<EventKind> {
        match self {
            EventKind::Created => Some(EventKind::PickedUp),
            EventKind::PickedUp => Some(EventKind::InTransit),
            EventKind::InTransit => Some(EventKind::Delivered),
            EventKind::Delivered => Some(EventKind::Listed),
            EventKind::Listed => Some(EventKind::Sold),
            EventKind::Sold => None,
        }
    }

    /// Check the transition table: `Created` opens a chain, every other kind
    /// must be the successor of the chain's last kind
    pub fn allowed_after(&self, previous: Option<EventKind>) -> bool {
        match previous {
            None => *self == EventKind::Created,
            Some(prev) => prev.successor() == Some(*self),
        }
    }

    /// Kinds by which a new party takes custody of the batch
    pub fn takes_custody(&self) -> bool {
        matches!(
            self,
            EventKind::PickedUp | EventKind::Delivered | EventKind::Listed
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.successor().is_none()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::PickedUp => "picked_up",
            EventKind::InTransit => "in_transit",
            EventKind::Delivered => "delivered",
            EventKind::Listed => "listed",
            EventKind::Sold => "sold",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown event kind '{}'", s))
    }
}

/// Which roles may emit which event kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    grants: BTreeMap<Role, BTreeSet<EventKind>>,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::empty()
            .grant(Role::Farmer, [EventKind::Created])
            .grant(
                Role::Transporter,
                [EventKind::PickedUp, EventKind::InTransit, EventKind::Delivered],
            )
            .grant(Role::Retailer, [EventKind::Listed, EventKind::Sold])
    }
}

impl RolePolicy {
    /// A policy that grants nothing
    pub fn empty() -> Self {
        Self {
            grants: BTreeMap::new(),
        }
    }

    /// Allow `role` to emit `kinds` (ignored for consumers)
    pub fn grant(mut self, role: Role, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        if role == Role::Consumer {
            return self;
        }
        self.grants.entry(role).or_default().extend(kinds);
        self
    }

    /// Check whether `role` may emit `kind`
    pub fn permits(&self, role: Role, kind: EventKind) -> bool {
        role != Role::Consumer
            && self
                .grants
                .get(&role)
                .map(|kinds| kinds.contains(&kind))
                .unwrap_or(false)
    }

    /// Kinds granted to a role
    pub fn kinds_for(&self, role: Role) -> Vec<EventKind> {
        self.grants
            .get(&role)
            .map(|kinds| kinds.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Parse a table such as
    /// `farmer=created;transporter=picked_up,in_transit,delivered;retailer=listed,sold`
    pub fn parse(table: &str) -> Result<Self, String> {
        let mut policy = Self::empty();
        for entry in table.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (role, kinds) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected 'role=kind,kind', got '{}'", entry))?;
            let role: Role = role.parse()?;
            if role == Role::Consumer {
                return Err("consumers cannot be granted event kinds".into());
            }
            let kinds = kinds
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(EventKind::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            policy = policy.grant(role, kinds);
        }
        Ok(policy)
    }
}
