//! Encrypted File Store - one sealed file per audit event
//!
//! Record layout of `<event_id>.audit`:
//!
//! ```text
//! magic (4) | nonce (12) | ChaCha20-Poly1305( lz4( json(event) ) )
//! ```
//!
//! The event id is bound as associated data, so a record renamed to
//! another id fails authentication. Writes go to a temp file first and
//! are renamed into place. All access goes through one process-local
//! lock; the store is not safe for several processes sharing a directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::domain::audit::AuditEvent;
use crate::domain::error::ObservabilityError;
use crate::ports::{AuditQuery, AuditStorage};

/// Minimum accepted passphrase length in bytes.
pub const MIN_KEY_LEN: usize = 32;

const MAGIC: &[u8; 4] = b"TAE1";
const NONCE_LEN: usize = 12;
const EXTENSION: &str = "audit";

/// Directory-backed `AuditStorage` with authenticated encryption at rest.
pub struct EncryptedFileStorage {
    dir: PathBuf,
    cipher: ChaCha20Poly1305,
    lock: Mutex<()>,
}

impl std::fmt::Debug for EncryptedFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStorage")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStorage {
    /// Open (creating if needed) a store under `dir`.
    ///
    /// The 256-bit cipher key is the SHA-256 digest of `passphrase`.
    pub async fn new(dir: impl AsRef<Path>, passphrase: &str) -> Result<Self, ObservabilityError> {
        if passphrase.len() < MIN_KEY_LEN {
            return Err(ObservabilityError::Configuration(format!(
                "audit encryption key must be at least {MIN_KEY_LEN} bytes, got {}",
                passphrase.len()
            )));
        }
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            ObservabilityError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;

        let key = hmac_sha256::Hash::hash(passphrase.as_bytes());
        Ok(Self {
            dir,
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize, compress and encrypt one event.
    pub fn seal(&self, event: &AuditEvent) -> Result<Vec<u8>, ObservabilityError> {
        let json = serde_json::to_vec(event)
            .map_err(|e| ObservabilityError::Storage(format!("serialize: {e}")))?;
        let compressed = lz4_flex::compress_prepend_size(&json);

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &compressed,
                    aad: event.event_id().as_bytes(),
                },
            )
            .map_err(|_| ObservabilityError::Storage("encryption failed".to_string()))?;

        let mut record = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
        record.extend_from_slice(MAGIC);
        record.extend_from_slice(&nonce);
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    /// Reverse of `seal`; fails on any tampering or id mismatch.
    pub fn open(&self, event_id: &str, record: &[u8]) -> Result<AuditEvent, ObservabilityError> {
        let corrupt = |what: &str| ObservabilityError::Storage(format!("record {event_id}: {what}"));

        let body = record
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| corrupt("bad magic"))?;
        if body.len() < NONCE_LEN {
            return Err(corrupt("truncated"));
        }
        let (nonce, ciphertext) = body.split_at(NONCE_LEN);
        let compressed = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: event_id.as_bytes(),
                },
            )
            .map_err(|_| corrupt("authentication failed"))?;
        let json = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| corrupt(&format!("decompress: {e}")))?;
        let event: AuditEvent =
            serde_json::from_slice(&json).map_err(|e| corrupt(&format!("parse: {e}")))?;
        if event.event_id() != event_id {
            return Err(corrupt("event id mismatch"));
        }
        Ok(event)
    }

    fn path_for(&self, event_id: &str) -> Result<PathBuf, ObservabilityError> {
        let valid = !event_id.is_empty()
            && event_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ObservabilityError::Storage(format!(
                "invalid event id {event_id:?}"
            )));
        }
        Ok(self.dir.join(format!("{event_id}.{EXTENSION}")))
    }

    async fn read_all(&self) -> Result<Vec<AuditEvent>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;

        let mut events = Vec::new();
        let mut skipped = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(event_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let opened = match fs::read(&path).await {
                Ok(bytes) => self.open(event_id, &bytes),
                Err(e) => Err(ObservabilityError::Storage(e.to_string())),
            };
            match opened {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped += 1;
                    warn!(file = %path.display(), error = %e, "Skipping unreadable audit record");
                }
            }
        }
        debug!(loaded = events.len(), skipped, "Audit directory scanned");
        Ok(events)
    }
}

#[async_trait]
impl AuditStorage for EncryptedFileStorage {
    #[instrument(skip(self, event), fields(event_id = %event.event_id()))]
    async fn store(&self, event: &AuditEvent) -> Result<()> {
        let path = self.path_for(event.event_id())?;
        let record = self.seal(event)?;
        let tmp = path.with_extension("tmp");

        let _guard = self.lock.lock().await;
        fs::write(&tmp, &record)
            .await
            .context("Failed to write audit record")?;
        fs::rename(&tmp, &path)
            .await
            .context("Failed to move audit record into place")?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let _guard = self.lock.lock().await;
        let events = self.read_all().await?;
        Ok(query.apply(events))
    }

    async fn delete(&self, event_ids: &[String]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut deleted = 0;
        for id in event_ids {
            let path = match self.path_for(id) {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "Refusing to delete audit record");
                    continue;
                }
            };
            match fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to delete {}", path.display()));
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditEventType;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn event(correlation: &str) -> AuditEvent {
        AuditEvent::new(AuditEventType::UserAccess, correlation, "system", "access", "session")
            .with_detail("outcome", "granted")
    }

    #[tokio::test]
    async fn test_short_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = EncryptedFileStorage::new(dir.path(), "short").await.unwrap_err();
        assert!(matches!(err, ObservabilityError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_round_trip_and_ciphertext_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let storage = EncryptedFileStorage::new(dir.path(), KEY).await.unwrap();
        let original = event("corr-plaintext-marker");
        storage.store(&original).await.unwrap();

        let path = dir.path().join(format!("{}.audit", original.event_id()));
        let raw = std::fs::read(&path).unwrap();
        assert!(raw.starts_with(MAGIC));
        assert!(!String::from_utf8_lossy(&raw).contains("corr-plaintext-marker"));

        let found = storage
            .query(&AuditQuery::all().correlation_id("corr-plaintext-marker"))
            .await
            .unwrap();
        assert_eq!(found, vec![original]);
    }

    #[tokio::test]
    async fn test_corrupt_and_renamed_records_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = EncryptedFileStorage::new(dir.path(), KEY).await.unwrap();
        let good = event("c");
        let moved = event("c");
        storage.store(&good).await.unwrap();
        storage.store(&moved).await.unwrap();

        std::fs::write(dir.path().join("garbage.audit"), b"not a record").unwrap();
        std::fs::rename(
            dir.path().join(format!("{}.audit", moved.event_id())),
            dir.path().join("renamed-id.audit"),
        )
        .unwrap();

        let found = storage.query(&AuditQuery::all()).await.unwrap();
        assert_eq!(found, vec![good]);
    }

    #[tokio::test]
    async fn test_wrong_key_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EncryptedFileStorage::new(dir.path(), KEY).await.unwrap();
        writer.store(&event("c")).await.unwrap();

        let reader = EncryptedFileStorage::new(dir.path(), "ffffffffffffffffffffffffffffffff")
            .await
            .unwrap();
        assert!(reader.query(&AuditQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_stays_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = EncryptedFileStorage::new(dir.path(), KEY).await.unwrap();
        let e = event("c");
        storage.store(&e).await.unwrap();

        let ids = vec![
            "../escape".to_string(),
            e.event_id().to_string(),
            "never-stored".to_string(),
        ];
        assert_eq!(storage.delete(&ids).await.unwrap(), 1);
        assert!(storage.query(&AuditQuery::all()).await.unwrap().is_empty());
    }
}
