//! Identity and addressing types shared across the ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Opaque identity handle of a party (a wallet-style `0x…` address in practice)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address from any string handle
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw handle
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Globally unique, immutable identifier of a harvested batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Wrap an externally assigned identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh identifier of the form `BATCH-<32 hex digits>`
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!("BATCH-{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Supply-chain role of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Transporter,
    Retailer,
    /// Read-only party; never appends
    Consumer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Farmer, Role::Transporter, Role::Retailer, Role::Consumer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Transporter => "transporter",
            Role::Retailer => "retailer",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "farmer" => Ok(Role::Farmer),
            "transporter" => Ok(Role::Transporter),
            "retailer" => Ok(Role::Retailer),
            "consumer" => Ok(Role::Consumer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A party attested by the identity registry, with its role and validity window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identity handle
    pub address: Address,

    /// Role held for the validity window
    pub role: Role,

    /// Start of the validity window (inclusive)
    pub valid_from: DateTime<Utc>,

    /// End of the validity window (exclusive); open-ended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl Actor {
    /// Create an actor valid from `valid_from` with no expiry
    pub fn new(address: impl Into<Address>, role: Role, valid_from: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            role,
            valid_from,
            valid_until: None,
        }
    }

    /// Bound the validity window
    pub fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }

    /// Check whether the validity window covers `at`
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        if at < self.valid_from {
            return false;
        }
        match self.valid_until {
            Some(until) => at < until,
            None => true,
        }
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// SHA-256 digest, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Sentinel used as `prev_hash` of the first event in every chain
    pub const ZERO: Digest = Digest([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character lowercase hex digest
    pub fn from_hex(s: &str) -> Result<Self, String> {
        if s.len() != 64 || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(format!("expected 64 lowercase hex characters, got '{}'", s));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| e.to_string())?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
