//! Represents a stored identity document's durable descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The audit record written for every successfully stored document.
///
/// A `StoredDocument` exists only after the full admission pipeline has
/// accepted the upload and the storage gateway has durably written the
/// payload. The row is immutable; retention and deletion are handled by an
/// external process, never by this service.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredDocument {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// The principal that submitted the document.
    pub principal_id: String,

    /// Storage key under which the payload lives. Always prefixed with
    /// `principal_id`, which downstream access policies rely on.
    pub storage_key: String,

    /// Original (sanitized) file name of the uploaded document.
    pub file_name: String,

    /// Declared content type (MIME type), already validated against the
    /// configured whitelist.
    pub content_type: String,

    /// Payload size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the stored payload, for integrity verification.
    pub etag: String,

    /// When the gateway acknowledged the write.
    pub stored_at: DateTime<Utc>,
}
