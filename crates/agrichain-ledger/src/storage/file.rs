//! JSON-lines file event log
//!
//! One file per batch under a data directory, named after the base64url form
//! of the batch id. Every line is the canonical encoding of one event, so the
//! files can be handed to a standalone verifier as they are.
//!
//! A line only counts once its terminating newline is on disk. A trailing
//! fragment without one is an interrupted write: readers ignore it and the
//! next writer cuts it off before appending.

use agrichain_core::{codec, BatchEvent, BatchId, KeyPair, PublicKey};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ChainRead, EventLog, Receipt, StorageError};

const EXTENSION: &str = "jsonl";

/// Next free sequence of a chain, `None` until read from disk
type NextSequence = Arc<Mutex<Option<u64>>>;

/// File-backed event log
#[derive(Debug)]
pub struct FileLog {
    dir: PathBuf,
    signer: Option<KeyPair>,
    writers: std::sync::Mutex<HashMap<BatchId, NextSequence>>,
}

impl FileLog {
    /// Open (creating if needed) a log rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "Opened file event log");
        Ok(Self {
            dir,
            signer: None,
            writers: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Sign every receipt with `key`
    pub fn with_signer(mut self, key: KeyPair) -> Self {
        self.signer = Some(key);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a batch chain
    pub fn chain_path(&self, batch_id: &BatchId) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(batch_id.as_str()),
            EXTENSION
        ))
    }

    fn writer(&self, batch_id: &BatchId) -> NextSequence {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        writers.entry(batch_id.clone()).or_default().clone()
    }

    /// Count committed lines, cutting off an interrupted trailing write
    async fn recover(path: &Path) -> Result<u64, StorageError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let committed = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|end| end + 1)
            .unwrap_or(0);

        if committed < bytes.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - committed,
                "Discarding interrupted write"
            );
            let file = OpenOptions::new().write(true).open(path).await?;
            file.set_len(committed as u64).await?;
            file.sync_all().await?;
        }

        Ok(bytes[..committed].iter().filter(|b| **b == b'\n').count() as u64)
    }
}

/// Parse the committed lines of a chain file
fn parse_chain(bytes: &[u8]) -> ChainRead {
    let mut read = ChainRead::default();
    let Some(end) = bytes.iter().rposition(|b| *b == b'\n') else {
        return read;
    };

    for (position, line) in bytes[..end].split(|b| *b == b'\n').enumerate() {
        match codec::decode_unverified(line) {
            Ok(event) => read.events.push(event),
            Err(e) => {
                warn!(position, error = %e, "Unreadable record in chain file");
                read.unreadable_at = Some(position as u64);
                break;
            }
        }
    }
    read
}

#[async_trait]
impl EventLog for FileLog {
    async fn submit(&self, event: &BatchEvent) -> Result<Receipt, StorageError> {
        let writer = self.writer(&event.batch_id);
        let mut next = writer.lock().await;
        let path = self.chain_path(&event.batch_id);

        let expected = match *next {
            Some(n) => n,
            None => Self::recover(&path).await?,
        };
        *next = Some(expected);

        if event.sequence != expected {
            return Err(StorageError::Conflict {
                batch_id: event.batch_id.clone(),
                expected,
                got: event.sequence,
            });
        }

        let mut line = codec::encode(event).map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push(b'\n');

        // Unknown until the line is durable; re-read from disk if interrupted
        *next = None;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        *next = Some(expected + 1);

        debug!(batch_id = %event.batch_id, sequence = event.sequence, "Appended event line");
        Receipt::issue(event, self.signer.as_ref())
    }

    async fn read_chain(&self, batch_id: &BatchId) -> Result<ChainRead, StorageError> {
        match fs::read(self.chain_path(batch_id)).await {
            Ok(bytes) => Ok(parse_chain(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChainRead::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn batch_ids(&self) -> Result<Vec<BatchId>, StorageError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(EXTENSION) {
                continue;
            }
            let decoded = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| URL_SAFE_NO_PAD.decode(stem).ok())
                .and_then(|raw| String::from_utf8(raw).ok());
            let Some(id) = decoded else {
                warn!(path = %path.display(), "Skipping file with undecodable batch id");
                continue;
            };
            // A lone torn first write has no committed line yet
            if fs::read(&path).await?.contains(&b'\n') {
                ids.push(BatchId::new(id));
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn receipt_key(&self) -> Option<PublicKey> {
        self.signer.as_ref().map(KeyPair::public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_unterminated_tail() {
        assert_eq!(parse_chain(b""), ChainRead::default());
        assert_eq!(parse_chain(b"{\"v\":1,\"batch"), ChainRead::default());
    }

    #[test]
    fn test_parse_flags_garbage_line() {
        let read = parse_chain(b"not a record\n");
        assert!(read.events.is_empty());
        assert_eq!(read.unreadable_at, Some(0));
    }

    #[tokio::test]
    async fn test_torn_first_write_is_not_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileLog::open(dir.path()).await.unwrap();

        std::fs::write(log.chain_path(&BatchId::new("TORN")), b"{\"v\":1,\"batch").unwrap();
        std::fs::write(log.chain_path(&BatchId::new("EMPTY")), b"").unwrap();
        std::fs::write(log.chain_path(&BatchId::new("KEPT")), b"not a record\n").unwrap();

        assert_eq!(log.batch_ids().await.unwrap(), vec![BatchId::new("KEPT")]);
        assert!(log.read_chain(&BatchId::new("TORN")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chain_path_escapes_batch_id() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileLog::open(dir.path()).await.unwrap();

        let path = log.chain_path(&BatchId::new("../etc/passwd"));
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.extension().and_then(|s| s.to_str()), Some("jsonl"));
    }
}
