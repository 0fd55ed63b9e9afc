//! Scannable code payloads
//!
//! Text embedded in a batch's QR code. Two forms:
//!
//! - `agrichain:v1:e:<base64url>` carries the full canonical bytes of the
//!   batch's `Created` event, verifiable without contacting the ledger
//! - `agrichain:v1:r:<batch id>` is a compact reference resolved by lookup

use crate::codec::{self, FORMAT_VERSION};
use crate::error::{CoreError, Result};
use crate::event::BatchEvent;
use crate::lifecycle::EventKind;
use crate::types::BatchId;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

const SCHEME: &str = "agrichain";

/// Decoded content of a scanned code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCode {
    /// Full `Created` event
    Event(BatchEvent),
    /// Reference to be resolved against the ledger
    Reference { batch_id: BatchId, version: u32 },
}

impl ScanCode {
    /// Code embedding the batch's `Created` event
    pub fn for_created(event: &BatchEvent) -> Result<Self> {
        if event.kind != EventKind::Created {
            return Err(CoreError::Decode(format!(
                "scan codes embed the created event, got '{}'",
                event.kind
            )));
        }
        Ok(ScanCode::Event(event.clone()))
    }

    pub fn reference(batch_id: BatchId) -> Self {
        ScanCode::Reference {
            batch_id,
            version: FORMAT_VERSION,
        }
    }

    /// Batch the code points at
    pub fn batch_id(&self) -> &BatchId {
        match self {
            ScanCode::Event(event) => &event.batch_id,
            ScanCode::Reference { batch_id, .. } => batch_id,
        }
    }

    /// Render the code as text for QR embedding
    pub fn to_text(&self) -> Result<String> {
        match self {
            ScanCode::Event(event) => {
                let bytes = codec::encode(event)?;
                Ok(format!(
                    "{}:v{}:e:{}",
                    SCHEME,
                    FORMAT_VERSION,
                    URL_SAFE_NO_PAD.encode(bytes)
                ))
            }
            ScanCode::Reference { batch_id, version } => {
                Ok(format!("{}:v{}:r:{}", SCHEME, version, batch_id))
            }
        }
    }

    /// Parse scanned text; embedded events are fully decoded and verified
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.trim().splitn(4, ':');
        let (scheme, version, form, body) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(s), Some(v), Some(f), Some(b)) => (s, v, f, b),
                _ => return Err(CoreError::Decode(format!("not a batch code: '{}'", text))),
            };

        if scheme != SCHEME {
            return Err(CoreError::Decode(format!("unknown scheme '{}'", scheme)));
        }
        let version: u32 = version
            .strip_prefix('v')
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| CoreError::Decode(format!("bad version tag '{}'", version)))?;
        if version != FORMAT_VERSION {
            return Err(CoreError::UnsupportedVersion(version));
        }
        if body.is_empty() {
            return Err(CoreError::Decode("empty code body".into()));
        }

        match form {
            "e" => {
                let bytes = URL_SAFE_NO_PAD.decode(body)?;
                let event = codec::decode(&bytes)?;
                if event.kind != EventKind::Created || !event.is_genesis() {
                    return Err(CoreError::Decode(
                        "embedded event is not a batch's created event".into(),
                    ));
                }
                Ok(ScanCode::Event(event))
            }
            "r" => Ok(ScanCode::Reference {
                batch_id: BatchId::new(body),
                version,
            }),
            other => Err(CoreError::Decode(format!("unknown code form '{}'", other))),
        }
    }
}
