//! HTTP handlers for document submission and descriptor retrieval.
//!
//! Extracts the multipart payload and bearer token, then delegates every
//! admission decision to `IntakeService`; no validation or authorization
//! logic lives at this layer.

use crate::{errors::AppError, models::document::StoredDocument, services::validator::UploadRequest};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use uuid::Uuid;

use crate::state::AppState;

/// Name of the multipart part carrying the document payload.
const FILE_PART: &str = "file";

/// Extract the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
}

/// POST `/documents` — submit an identity document.
///
/// Expects a multipart body with a `file` part. A missing or empty part is
/// handed to the service as an empty request so the rejection comes from
/// the validator, tagged like every other admission failure.
pub async fn submit_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(&headers);

    let mut request = UploadRequest {
        bytes: Bytes::new(),
        file_name: String::new(),
        content_type: String::new(),
        declared_size_bytes: 0,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {err}")))?
    {
        if field.name() != Some(FILE_PART) {
            continue;
        }

        request.file_name = field.file_name().unwrap_or_default().to_string();
        request.content_type = field.content_type().unwrap_or_default().to_string();
        request.bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("could not read file part: {err}")))?;
        request.declared_size_bytes = request.bytes.len() as u64;
        break;
    }

    let document = state.intake.submit(token, request).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET `/documents/{id}` — fetch a stored descriptor, owner-only.
///
/// Documents owned by another principal are indistinguishable from
/// documents that do not exist.
pub async fn get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredDocument>, AppError> {
    let token = bearer_token(&headers);
    let document = state
        .intake
        .fetch(token, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("document `{id}` not found")))?;
    Ok(Json(document))
}
