//! Storage gateway — the durable-write boundary of the intake pipeline.
//!
//! The gateway owns the only externally visible side effect of a
//! submission: writing the payload and its audit row. Everything before it
//! is pure or read-only, so a failure at any earlier stage leaves nothing
//! to clean up. Writes are non-overwrite by default; a key that already
//! exists is a hard conflict, never a silent replace.

use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use crate::models::{document::StoredDocument, principal::Principal};
use crate::services::keygen::StorageKey;

/// Write options for a gateway `put`.
///
/// The intake pipeline always requests `overwrite: false`; the flag exists
/// so the fail-closed behavior is explicit at every call site rather than
/// an implementation accident.
#[derive(Clone, Copy, Debug)]
pub struct PutOptions {
    pub overwrite: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self { overwrite: false }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The storage layer refused the write for policy reasons. Kept
    /// deliberately detail-free; storage-policy internals stay internal.
    #[error("storage access denied")]
    AccessDenied,
    /// No space or quota left on the backing store.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    /// The key already holds a document and overwrite was not requested.
    #[error("document already exists under key `{0}`")]
    KeyConflict(String),
    /// Transient transport or I/O failure; safe for the caller to retry
    /// with a freshly derived key.
    #[error("storage write failed: {0}")]
    Network(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Interface to durable, access-controlled object storage.
///
/// `put` performs the write and records the audit descriptor; `lookup`
/// reads a descriptor back, scoped to its owner. Policy administration
/// (who may read a stored payload) lives outside this service; the
/// principal-prefixed key scheme is the contract those policies rely on.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn put(
        &self,
        key: &StorageKey,
        bytes: Bytes,
        content_type: &str,
        options: PutOptions,
    ) -> GatewayResult<StoredDocument>;

    async fn lookup(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> GatewayResult<Option<StoredDocument>>;
}

/// Gateway backed by local disk for payloads and SQLite for descriptors.
///
/// Payloads land under `base_path/{principal}/{millis}-{name}`; the key's
/// principal prefix becomes a directory, which keeps per-principal
/// partitioning visible on disk as well.
#[derive(Clone)]
pub struct FsStorageGateway {
    /// Shared SQLite connection pool holding the audit rows.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
}

impl FsStorageGateway {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    fn payload_path(&self, key: &StorageKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Write bytes to a temp file in the target directory, fsync, then
    /// link into place. `hard_link` refuses to clobber an existing file,
    /// which is what gives the non-overwrite path its atomicity: two
    /// racing writers for one key cannot both win.
    async fn write_payload(
        &self,
        key: &StorageKey,
        bytes: &Bytes,
        overwrite: bool,
    ) -> GatewayResult<()> {
        let final_path = self.payload_path(key);
        let parent = final_path
            .parent()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| GatewayError::Network("payload path missing parent".into()))?;
        fs::create_dir_all(&parent).await.map_err(classify_io)?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await.map_err(classify_io)?;
            file.write_all(bytes).await.map_err(classify_io)?;
            file.flush().await.map_err(classify_io)?;
            file.sync_all().await.map_err(classify_io)?;

            if overwrite {
                fs::rename(&tmp_path, &final_path)
                    .await
                    .map_err(classify_io)?;
            } else {
                fs::hard_link(&tmp_path, &final_path)
                    .await
                    .map_err(|err| {
                        if err.kind() == ErrorKind::AlreadyExists {
                            GatewayError::KeyConflict(key.as_str().to_string())
                        } else {
                            classify_io(err)
                        }
                    })?;
            }
            Ok(())
        }
        .await;

        // The hard-link path leaves the temp name behind on success too.
        if let Err(err) = fs::remove_file(&tmp_path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to remove temp file {}: {}", tmp_path.display(), err);
            }
        }

        result
    }
}

#[async_trait]
impl StorageGateway for FsStorageGateway {
    async fn put(
        &self,
        key: &StorageKey,
        bytes: Bytes,
        content_type: &str,
        options: PutOptions,
    ) -> GatewayResult<StoredDocument> {
        self.write_payload(key, &bytes, options.overwrite).await?;

        let (principal_id, file_name) = split_key(key);
        let document = StoredDocument {
            id: Uuid::new_v4(),
            principal_id,
            storage_key: key.as_str().to_string(),
            file_name,
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as i64,
            etag: format!("{:x}", md5::compute(&bytes)),
            stored_at: Utc::now(),
        };

        let insert = sqlx::query(
            "INSERT INTO documents (
                id, principal_id, storage_key, file_name, content_type,
                size_bytes, etag, stored_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id)
        .bind(&document.principal_id)
        .bind(&document.storage_key)
        .bind(&document.file_name)
        .bind(&document.content_type)
        .bind(document.size_bytes)
        .bind(&document.etag)
        .bind(document.stored_at)
        .execute(&*self.db)
        .await;

        match insert {
            Ok(_) => Ok(document),
            Err(err) => {
                // Descriptor insert failed: the payload alone must not
                // survive without its audit row.
                let _ = fs::remove_file(self.payload_path(key)).await;
                if is_unique_violation(&err) {
                    Err(GatewayError::KeyConflict(key.as_str().to_string()))
                } else {
                    Err(GatewayError::Network(err.to_string()))
                }
            }
        }
    }

    async fn lookup(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> GatewayResult<Option<StoredDocument>> {
        sqlx::query_as::<_, StoredDocument>(
            "SELECT id, principal_id, storage_key, file_name, content_type,
                    size_bytes, etag, stored_at
             FROM documents
             WHERE id = ? AND principal_id = ?",
        )
        .bind(id)
        .bind(&principal.id)
        .fetch_optional(&*self.db)
        .await
        .map_err(|err| GatewayError::Network(err.to_string()))
    }
}

/// Split a derived key back into its principal prefix and file segment.
fn split_key(key: &StorageKey) -> (String, String) {
    let raw = key.as_str();
    match raw.split_once('/') {
        Some((principal, rest)) => {
            let file_name = rest.split_once('-').map(|(_, f)| f).unwrap_or(rest);
            (principal.to_string(), file_name.to_string())
        }
        None => (String::new(), raw.to_string()),
    }
}

/// Classify an I/O failure into the gateway taxonomy.
fn classify_io(err: io::Error) -> GatewayError {
    match err.kind() {
        ErrorKind::PermissionDenied => GatewayError::AccessDenied,
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => GatewayError::QuotaExceeded,
        _ => GatewayError::Network(err.to_string()),
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::principal::Principal;
    use crate::services::keygen::{Clock, derive_key};

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    async fn gateway() -> FsStorageGateway {
        // One connection only: every pooled connection to `sqlite::memory:`
        // would otherwise get its own empty database.
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE documents (
                id TEXT PRIMARY KEY,
                principal_id TEXT NOT NULL,
                storage_key TEXT NOT NULL UNIQUE,
                file_name TEXT NOT NULL,
                content_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                etag TEXT NOT NULL,
                stored_at TEXT NOT NULL
            )",
        )
        .execute(&db)
        .await
        .unwrap();

        let base = std::env::temp_dir().join(format!("id-intake-test-{}", Uuid::new_v4()));
        FsStorageGateway::new(Arc::new(db), base)
    }

    fn key_for(principal: &str, millis: i64) -> StorageKey {
        derive_key(
            &Principal {
                id: principal.into(),
            },
            "front.jpg",
            &FixedClock(millis),
        )
    }

    #[tokio::test]
    async fn put_stores_payload_and_descriptor() {
        let gw = gateway().await;
        let key = key_for("user-42", 1_700_000_000_000);
        let payload = Bytes::from_static(b"fake jpeg bytes");

        let doc = gw
            .put(&key, payload.clone(), "image/jpeg", PutOptions::default())
            .await
            .unwrap();

        assert_eq!(doc.storage_key, "user-42/1700000000000-front.jpg");
        assert_eq!(doc.principal_id, "user-42");
        assert_eq!(doc.size_bytes, payload.len() as i64);
        assert_eq!(doc.etag, format!("{:x}", md5::compute(&payload)));

        let on_disk = fs::read(gw.payload_path(&key)).await.unwrap();
        assert_eq!(on_disk, payload);
    }

    #[tokio::test]
    async fn second_put_on_same_key_conflicts_and_keeps_first_payload() {
        let gw = gateway().await;
        let key = key_for("user-42", 1_700_000_000_000);

        gw.put(&key, Bytes::from_static(b"first"), "image/jpeg", PutOptions::default())
            .await
            .unwrap();
        let err = gw
            .put(&key, Bytes::from_static(b"second"), "image/jpeg", PutOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::KeyConflict(_)));
        let on_disk = fs::read(gw.payload_path(&key)).await.unwrap();
        assert_eq!(on_disk, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn lookup_is_scoped_to_the_owning_principal() {
        let gw = gateway().await;
        let key = key_for("user-42", 1_700_000_000_000);
        let doc = gw
            .put(&key, Bytes::from_static(b"payload"), "image/png", PutOptions::default())
            .await
            .unwrap();

        let owner = Principal { id: "user-42".into() };
        let stranger = Principal { id: "user-7".into() };

        let found = gw.lookup(&owner, doc.id).await.unwrap();
        assert_eq!(found.map(|d| d.storage_key), Some(doc.storage_key));
        assert!(gw.lookup(&stranger, doc.id).await.unwrap().is_none());
    }
}
