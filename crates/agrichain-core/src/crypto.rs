//! Commit receipts
//!
//! When the ledger commits an event it returns a receipt: a COSE_Sign1
//! structure, signed with the ledger's Ed25519 key, over the claim
//! "event `hash` sits at `sequence` of `batch_id`". Anyone holding the ledger
//! public key can check a receipt offline.
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair held by the ledger
//! - `PublicKey`: Ed25519 public key for verification
//! - `ReceiptClaim`: what a receipt attests
//! - `SignedReceipt`: COSE_Sign1 wrapped claim

use crate::error::{CoreError, Result};
use crate::event::BatchEvent;
use crate::types::{BatchId, Digest};
use chrono::{DateTime, Utc};
use coset::{iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// COSE algorithm identifier for EdDSA (Ed25519)
const EDDSA_ALG: iana::Algorithm = iana::Algorithm::EdDSA;

/// What a commit receipt attests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptClaim {
    pub batch_id: BatchId,
    pub sequence: u64,
    /// Seal of the committed event
    pub hash: Digest,
    pub committed_at: DateTime<Utc>,
}

impl ReceiptClaim {
    /// Build the claim for a committed event
    pub fn for_event(event: &BatchEvent, committed_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: event.batch_id.clone(),
            sequence: event.sequence,
            hash: event.hash,
            committed_at,
        }
    }

    /// Check that the claim covers exactly this event
    pub fn covers(&self, event: &BatchEvent) -> bool {
        self.batch_id == event.batch_id && self.sequence == event.sequence && self.hash == event.hash
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(CoreError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(CoreError::from)
    }
}

/// A signed receipt (COSE_Sign1 wrapped claim)
#[derive(Debug, Clone)]
pub struct SignedReceipt {
    cose: CoseSign1,
}

impl SignedReceipt {
    /// Get the key ID from the protected header
    pub fn kid(&self) -> Option<String> {
        let kid = &self.cose.protected.header.key_id;
        if kid.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(kid).to_string())
        }
    }

    pub fn signature(&self) -> &[u8] {
        &self.cose.signature
    }

    /// Serialize to CBOR bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.cose.clone().to_vec().map_err(CoreError::from)
    }

    /// Deserialize from CBOR bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cose = CoseSign1::from_slice(bytes).map_err(CoreError::from)?;
        Ok(Self { cose })
    }

    /// Extract the claim without checking the signature
    ///
    /// Use `PublicKey::verify_receipt` before trusting the result.
    pub fn extract_claim(&self) -> Result<ReceiptClaim> {
        let payload = self
            .cose
            .payload
            .as_ref()
            .ok_or(CoreError::MissingField("payload".into()))?;
        ReceiptClaim::from_bytes(payload)
    }
}

/// Ed25519 key pair used to sign receipts
#[derive(Clone)]
pub struct KeyPair {
    kid: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate(kid: impl Into<String>) -> Self {
        Self::from_signing_key(kid, SigningKey::generate(&mut OsRng))
    }

    pub fn from_signing_key(kid: impl Into<String>, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            kid: kid.into(),
            signing_key,
            verifying_key,
        }
    }

    /// Restore a key pair from its 32-byte seed
    pub fn from_bytes(kid: impl Into<String>, seed: &[u8; 32]) -> Self {
        Self::from_signing_key(kid, SigningKey::from_bytes(seed))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The 32-byte seed `from_bytes` restores from
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            kid: self.kid.clone(),
            verifying_key: self.verifying_key,
        }
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a claim and wrap it in COSE_Sign1
    pub fn sign_receipt(&self, claim: &ReceiptClaim) -> Result<SignedReceipt> {
        let payload = claim.to_bytes()?;

        let protected = HeaderBuilder::new()
            .algorithm(EDDSA_ALG)
            .key_id(self.kid.as_bytes().to_vec())
            .build();

        let cose = CoseSign1Builder::new()
            .protected(protected)
            .payload(payload)
            .try_create_signature(&[], |data| {
                Ok::<_, CoreError>(self.signing_key.sign(data).to_bytes().to_vec())
            })?
            .build();

        Ok(SignedReceipt { cose })
    }
}

/// Ed25519 public key for receipt verification
#[derive(Clone)]
pub struct PublicKey {
    kid: String,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey").field("kid", &self.kid).finish()
    }
}

impl PublicKey {
    pub fn from_bytes(kid: impl Into<String>, bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)?;
        Ok(Self {
            kid: kid.into(),
            verifying_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify a signed receipt and extract its claim
    pub fn verify_receipt(&self, signed: &SignedReceipt) -> Result<ReceiptClaim> {
        let cose = &signed.cose;

        let kid = &cose.protected.header.key_id;
        if !kid.is_empty() {
            let kid_str = String::from_utf8_lossy(kid);
            if kid_str != self.kid {
                return Err(CoreError::Crypto(format!(
                    "Key ID mismatch: expected '{}', got '{}'",
                    self.kid, kid_str
                )));
            }
        }

        let signature_bytes: [u8; 64] = cose
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::Crypto("Invalid signature length".into()))?;
        let signature = Signature::from_bytes(&signature_bytes);

        self.verifying_key
            .verify(&cose.tbs_data(&[]), &signature)
            .map_err(|e| CoreError::Crypto(e.to_string()))?;

        signed.extract_claim()
    }
}

/// Serializable public key for publication (base64 key bytes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializablePublicKey {
    pub kid: String,
    pub key: String,
}

impl From<&PublicKey> for SerializablePublicKey {
    fn from(pk: &PublicKey) -> Self {
        use base64::{engine::general_purpose::STANDARD, Engine};
        Self {
            kid: pk.kid.clone(),
            key: STANDARD.encode(pk.to_bytes()),
        }
    }
}

impl TryFrom<SerializablePublicKey> for PublicKey {
    type Error = CoreError;

    fn try_from(spk: SerializablePublicKey) -> Result<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let bytes = STANDARD.decode(&spk.key)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Crypto("Invalid key length".into()))?;
        PublicKey::from_bytes(spk.kid, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> ReceiptClaim {
        ReceiptClaim {
            batch_id: BatchId::new("BATCH001"),
            sequence: 3,
            hash: Digest::from_bytes([7u8; 32]),
            committed_at: Utc::now(),
        }
    }

    #[test]
    fn test_sign_and_verify_receipt() {
        let kp = KeyPair::generate("ledger-1");
        let signed = kp.sign_receipt(&claim()).unwrap();

        assert_eq!(signed.kid(), Some("ledger-1".to_string()));
        assert_eq!(signed.signature().len(), 64);

        let verified = kp.public_key().verify_receipt(&signed).unwrap();
        assert_eq!(verified, signed.extract_claim().unwrap());
    }

    #[test]
    fn test_restored_key_verifies_earlier_receipt() {
        let original = KeyPair::generate("ledger-1");
        let signed = original.sign_receipt(&claim()).unwrap();

        let restored = KeyPair::from_bytes("ledger-1", &original.seed_bytes());
        assert_eq!(restored.verifying_key_bytes(), original.verifying_key_bytes());
        restored.public_key().verify_receipt(&signed).unwrap();
    }

    #[test]
    fn test_verification_fails_with_wrong_key() {
        let kp1 = KeyPair::generate("ledger-1");
        let kp2 = KeyPair::generate("ledger-1");

        let signed = kp1.sign_receipt(&claim()).unwrap();
        assert!(kp2.public_key().verify_receipt(&signed).is_err());
    }

    #[test]
    fn test_kid_mismatch_rejected() {
        let kp1 = KeyPair::generate("ledger-1");
        let signed = kp1.sign_receipt(&claim()).unwrap();

        let renamed = PublicKey::from_bytes("ledger-2", &kp1.verifying_key_bytes()).unwrap();
        assert!(matches!(renamed.verify_receipt(&signed), Err(CoreError::Crypto(_))));
    }

    #[test]
    fn test_cbor_roundtrip() {
        let kp = KeyPair::generate("ledger-1");
        let signed = kp.sign_receipt(&claim()).unwrap();

        let restored = SignedReceipt::from_bytes(&signed.to_bytes().unwrap()).unwrap();
        assert!(kp.public_key().verify_receipt(&restored).is_ok());
    }

    #[test]
    fn test_public_key_serialization() {
        let pk = KeyPair::generate("ledger-1").public_key();
        let serializable: SerializablePublicKey = (&pk).into();
        let restored: PublicKey = serializable.try_into().unwrap();
        assert_eq!(restored.to_bytes(), pk.to_bytes());
    }
}
