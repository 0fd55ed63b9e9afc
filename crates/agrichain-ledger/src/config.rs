//! Ledger and server configuration
//!
//! The role table and the transfer deadline policy are supplied from outside
//! the core. Every setting can be read from `AGRICHAIN_*` environment
//! variables; tests build configs directly.

use agrichain_core::{EventKind, RolePolicy};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: String,
    pub reason: String,
}

impl ConfigError {
    fn new(var: &str, reason: impl Into<String>) -> Self {
        Self {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

/// How long a transfer proposal stays open, per lifecycle stage
///
/// With nothing configured a proposal never expires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPolicy {
    default_deadline: Option<chrono::Duration>,
    per_stage: BTreeMap<EventKind, chrono::Duration>,
}

impl TransferPolicy {
    /// Proposals never expire
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Every proposal expires `deadline` after it is made
    pub fn with_default(mut self, deadline: chrono::Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }

    /// Override the deadline for proposals made while the batch sits at `stage`
    pub fn with_stage(mut self, stage: EventKind, deadline: chrono::Duration) -> Self {
        self.per_stage.insert(stage, deadline);
        self
    }

    /// Deadline for a proposal made at `stage`
    pub fn deadline_for(&self, stage: EventKind) -> Option<chrono::Duration> {
        self.per_stage
            .get(&stage)
            .copied()
            .or(self.default_deadline)
    }
}

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Longest wait for a batch's lock before `Busy`
    pub lock_timeout: Duration,
    pub transfer_policy: TransferPolicy,
    pub role_policy: RolePolicy,
    /// Key id of the receipt signing key; the key's fingerprint when unset
    pub receipt_kid: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2000),
            transfer_policy: TransferPolicy::unbounded(),
            role_policy: RolePolicy::default(),
            receipt_kid: None,
        }
    }
}

impl LedgerConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = lookup("AGRICHAIN_LOCK_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| ConfigError::new("AGRICHAIN_LOCK_TIMEOUT_MS", "expected milliseconds"))?;
            config.lock_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = lookup("AGRICHAIN_TRANSFER_DEADLINE_SECS") {
            let secs: i64 = secs.trim().parse().map_err(|_| {
                ConfigError::new("AGRICHAIN_TRANSFER_DEADLINE_SECS", "expected seconds")
            })?;
            if secs <= 0 {
                return Err(ConfigError::new(
                    "AGRICHAIN_TRANSFER_DEADLINE_SECS",
                    "deadline must be positive",
                ));
            }
            config.transfer_policy =
                TransferPolicy::unbounded().with_default(chrono::Duration::seconds(secs));
        }

        if let Some(table) = lookup("AGRICHAIN_ROLE_POLICY") {
            config.role_policy = RolePolicy::parse(&table)
                .map_err(|reason| ConfigError::new("AGRICHAIN_ROLE_POLICY", reason))?;
        }

        if let Some(kid) = lookup("AGRICHAIN_RECEIPT_KID") {
            if kid.trim().is_empty() {
                return Err(ConfigError::new("AGRICHAIN_RECEIPT_KID", "must not be empty"));
            }
            config.receipt_kid = Some(kid.trim().to_string());
        }

        Ok(config)
    }
}

/// Settings used only by the server binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory of the file-backed log; in-memory when absent
    pub data_dir: Option<PathBuf>,
    /// JSON list of actors provisioned at start-up
    pub registry_file: Option<PathBuf>,
    /// Seed file of the receipt signing key
    pub receipt_key_path: Option<PathBuf>,
    pub log_level: String,
}

impl ServerConfig {
    /// Where the receipt key lives: the configured path, else inside the
    /// data directory; `None` means a fresh key per run
    pub fn receipt_key_file(&self) -> Option<PathBuf> {
        self.receipt_key_path
            .clone()
            .or_else(|| self.data_dir.as_ref().map(|dir| dir.join("receipt.seed")))
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("AGRICHAIN_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| ConfigError::new("AGRICHAIN_PORT", "expected a port number"))?,
            None => 8080,
        };

        Ok(Self {
            port,
            data_dir: lookup("AGRICHAIN_DATA_DIR").map(PathBuf::from),
            registry_file: lookup("AGRICHAIN_REGISTRY_FILE").map(PathBuf::from),
            receipt_key_path: lookup("AGRICHAIN_RECEIPT_KEY_PATH").map(PathBuf::from),
            log_level: lookup("AGRICHAIN_LOG_LEVEL").unwrap_or_else(|| "info".into()),
        })
    }
}
