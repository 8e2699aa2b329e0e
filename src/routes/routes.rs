//! Defines routes for the document intake API.
//!
//! ## Structure
//! - `POST /documents`      — submit an identity document (multipart, bearer auth)
//! - `GET  /documents/{id}` — fetch a stored descriptor (owner-only)
//! - `GET  /healthz`        — liveness
//! - `GET  /readyz`         — readiness (DB + disk probes)

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        intake_handlers::{get_document, submit_document},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Multipart framing overhead allowed on top of the payload ceiling.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build and return the router for all intake routes.
///
/// The router carries shared state (`AppState`) to all handlers. The body
/// limit is sized from the configured upload ceiling so axum cuts off
/// oversized bodies before they are buffered; requests under the wire
/// limit still go through the validator's own size check.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // intake endpoints
        .route(
            "/documents",
            post(submit_document)
                .layer(DefaultBodyLimit::max(max_upload_bytes as usize + BODY_LIMIT_SLACK)),
        )
        .route("/documents/{id}", get(get_document))
}
