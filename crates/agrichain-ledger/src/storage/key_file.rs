//! Receipt signing key on disk
//!
//! The key is kept as its raw 32-byte Ed25519 seed. Reopening the same file
//! restores the same key, so receipts issued before a restart still verify
//! against the key the ledger publishes afterwards.

use agrichain_core::KeyPair;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::StorageError;

const SEED_LEN: usize = 32;

/// Key id derived from the public key, stable for as long as the seed is
pub fn fingerprint_kid(key: &KeyPair) -> String {
    let fingerprint: String = key.verifying_key_bytes()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("agrichain-{}", fingerprint)
}

/// Load the seed at `path`, creating it on first start
///
/// Without an explicit `kid` the key id is the key's fingerprint.
pub async fn load_or_create(path: &Path, kid: Option<&str>) -> Result<KeyPair, StorageError> {
    let seed = match fs::read(path).await {
        Ok(bytes) => {
            let seed: [u8; SEED_LEN] = bytes.as_slice().try_into().map_err(|_| {
                StorageError::Serialization(format!(
                    "receipt key {} holds {} bytes, expected {}",
                    path.display(),
                    bytes.len(),
                    SEED_LEN
                ))
            })?;
            info!(path = %path.display(), "Loaded receipt key");
            seed
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let seed = KeyPair::generate("").seed_bytes();
            write_seed(path, &seed).await?;
            info!(path = %path.display(), "Generated receipt key");
            seed
        }
        Err(e) => return Err(e.into()),
    };

    Ok(with_kid(&seed, kid))
}

/// Fresh key that lives only as long as the process
pub fn ephemeral(kid: Option<&str>) -> KeyPair {
    with_kid(&KeyPair::generate("").seed_bytes(), kid)
}

fn with_kid(seed: &[u8; SEED_LEN], kid: Option<&str>) -> KeyPair {
    let key = KeyPair::from_bytes("", seed);
    let kid = kid.map_or_else(|| fingerprint_kid(&key), str::to_string);
    KeyPair::from_bytes(kid, seed)
}

async fn write_seed(path: &Path, seed: &[u8; SEED_LEN]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(seed).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_once_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("receipt.seed");

        let first = load_or_create(&path, None).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), SEED_LEN);

        let second = load_or_create(&path, None).await.unwrap();
        assert_eq!(second.verifying_key_bytes(), first.verifying_key_bytes());
        assert_eq!(second.kid(), first.kid());
        assert!(first.kid().starts_with("agrichain-"));
    }

    #[tokio::test]
    async fn test_explicit_kid_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.seed");

        let key = load_or_create(&path, Some("ledger-eu-1")).await.unwrap();
        assert_eq!(key.kid(), "ledger-eu-1");
    }

    #[tokio::test]
    async fn test_wrong_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.seed");
        std::fs::write(&path, b"too short").unwrap();

        let err = load_or_create(&path, None).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_ephemeral_keys_differ() {
        assert_ne!(ephemeral(None).kid(), ephemeral(None).kid());
    }
}
