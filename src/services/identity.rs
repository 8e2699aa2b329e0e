//! Principal resolution against the authentication collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::warn;

use crate::models::principal::{Principal, Session};

/// Contract consumed from the authentication collaborator.
///
/// "No session" is reported as `None`, never as an error, so the resolver
/// can map it deterministically to an unauthenticated outcome. Providers
/// that can fail internally (e.g. a database lookup) log the failure and
/// report `None`; an upload must never be admitted on an ambiguous session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_session(&self, token: &str) -> Option<Session>;
}

/// Resolves the principal performing the current request.
#[derive(Clone)]
pub struct IdentityResolver {
    sessions: Arc<dyn SessionProvider>,
}

impl IdentityResolver {
    pub fn new(sessions: Arc<dyn SessionProvider>) -> Self {
        Self { sessions }
    }

    /// Resolve the authenticated principal for a bearer token.
    ///
    /// Returns `None` when no token was presented, the token has no
    /// session, or the session has expired. Expiry is checked here rather
    /// than in the provider so every provider gets the same rule.
    pub async fn resolve(&self, token: Option<&str>) -> Option<Principal> {
        let token = token?;
        let session = self.sessions.current_session(token).await?;

        if session.expires_at <= Utc::now() {
            return None;
        }

        Some(Principal {
            id: session.principal_id,
        })
    }
}

/// Session lookup backed by the shared SQLite pool.
#[derive(Clone)]
pub struct SqliteSessionProvider {
    db: Arc<SqlitePool>,
}

impl SqliteSessionProvider {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionProvider for SqliteSessionProvider {
    async fn current_session(&self, token: &str) -> Option<Session> {
        let result = sqlx::query_as::<_, Session>(
            "SELECT principal_id, expires_at FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&*self.db)
        .await;

        match result {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "session lookup failed, treating as unauthenticated");
                None
            }
        }
    }
}
