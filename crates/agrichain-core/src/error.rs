//! Error types for the AgriChain core

use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while building, encoding or signing batch events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Bytes could not be decoded into an event
    #[error("Decode error: {0}")]
    Decode(String),

    /// Encoded record carries a format version this build does not understand
    #[error("Unsupported record format version {0}")]
    UnsupportedVersion(u32),

    /// Bytes decode but are not the canonical encoding of the event they describe
    #[error("Record is not canonically encoded")]
    NonCanonical,

    /// Stored hash does not match the hash recomputed from the event fields
    #[error("Hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },

    /// Payload shape does not belong to the event kind
    #[error("Payload '{payload}' cannot be attached to a '{kind}' event")]
    PayloadMismatch { kind: String, payload: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CoreError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<coset::CoseError> for CoreError {
    fn from(err: coset::CoseError) -> Self {
        CoreError::Crypto(format!("COSE: {:?}", err))
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        CoreError::Decode(format!("invalid base64: {}", err))
    }
}
