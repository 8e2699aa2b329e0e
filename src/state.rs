//! Shared application state handed to every handler.

use std::{path::PathBuf, sync::Arc};

use sqlx::SqlitePool;

use crate::services::intake::IntakeService;

#[derive(Clone)]
pub struct AppState {
    /// The admission pipeline.
    pub intake: IntakeService,

    /// Shared SQLite pool, used directly only by the readiness probe.
    pub db: Arc<SqlitePool>,

    /// Base directory of the payload store, used by the readiness probe.
    pub base_path: PathBuf,
}
