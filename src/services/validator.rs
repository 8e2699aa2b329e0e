//! Admission validation for candidate uploads.
//!
//! Pure domain logic: no I/O, no clock, no storage. The validator is the
//! first gate of the pipeline and must be fully evaluated before any
//! network call happens, so an invalid upload costs nothing downstream.

use bytes::Bytes;
use serde::Serialize;

/// Default size ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default media-type whitelist for identity documents.
pub const DEFAULT_ALLOWED_MEDIA_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// One candidate upload, as handed over by the caller.
///
/// Transient: exists only for the duration of a single `submit` call.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Raw payload bytes.
    pub bytes: Bytes,
    /// File name as declared by the caller. Not trusted; sanitized before
    /// it is embedded in a storage key.
    pub file_name: String,
    /// MIME type as declared by the caller.
    pub content_type: String,
    /// Size as declared by the caller, in bytes.
    pub declared_size_bytes: u64,
}

/// Admission rules the validator checks against.
#[derive(Clone, Debug)]
pub struct AdmissionLimits {
    pub max_upload_bytes: u64,
    pub allowed_media_types: Vec<String>,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_media_types: DEFAULT_ALLOWED_MEDIA_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

/// Why a candidate upload was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// No payload was provided at all.
    MissingFile,
    /// Declared size exceeds the configured ceiling.
    FileTooLarge { limit: u64 },
    /// Declared MIME type is not on the whitelist.
    UnsupportedMediaType { declared: String },
}

/// Outcome of admission validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted,
    Rejected(RejectReason),
}

/// Check a candidate upload against the admission rules.
///
/// Checks run in a fixed order and short-circuit on the first failure:
/// presence, then size ceiling, then MIME whitelist. Deterministic and
/// idempotent; the same input always yields the same verdict.
pub fn validate(request: &UploadRequest, limits: &AdmissionLimits) -> ValidationVerdict {
    if request.bytes.is_empty() {
        return ValidationVerdict::Rejected(RejectReason::MissingFile);
    }

    if request.declared_size_bytes > limits.max_upload_bytes {
        return ValidationVerdict::Rejected(RejectReason::FileTooLarge {
            limit: limits.max_upload_bytes,
        });
    }

    if !limits
        .allowed_media_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&request.content_type))
    {
        return ValidationVerdict::Rejected(RejectReason::UnsupportedMediaType {
            declared: request.content_type.clone(),
        });
    }

    ValidationVerdict::Accepted
}
