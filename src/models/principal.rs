//! The authenticated identity on whose behalf an upload occurs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An authenticated principal.
///
/// The id is opaque to this service; it is whatever the authentication
/// collaborator hands back. It is embedded as the first path segment of
/// every storage key, and never persisted here on its own.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
}

/// A session as reported by the authentication collaborator.
///
/// Owned by that collaborator; this service only reads it to resolve the
/// current principal and check expiry.
#[derive(Clone, FromRow, Debug)]
pub struct Session {
    pub principal_id: String,
    pub expires_at: DateTime<Utc>,
}
