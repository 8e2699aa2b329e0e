//! Upload orchestration.
//!
//! `IntakeService::submit` runs the admission pipeline as a linear state
//! machine: received, validated, authenticated, key derived, stored. Each
//! stage is a strict gate; the first failure aborts the submission with a
//! tagged reason and nothing earlier needs compensation, because no stage
//! before the gateway write has an externally visible effect.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::document::StoredDocument;
use crate::services::{
    gateway::{GatewayError, PutOptions, StorageGateway},
    identity::IdentityResolver,
    keygen::{self, Clock},
    validator::{self, AdmissionLimits, RejectReason, UploadRequest, ValidationVerdict},
};

/// The closed failure taxonomy callers can branch on.
///
/// Client-input variants carry the failing constraint so the caller can
/// correct and resubmit. Authorization variants carry the category only.
/// Environment variants distinguish retryable (`Network`, with a freshly
/// derived key) from fatal-for-this-submission (`QuotaExceeded`,
/// `KeyConflict`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("no file payload was provided")]
    MissingFile,
    #[error("file exceeds the maximum allowed size of {limit} bytes")]
    FileTooLarge { limit: u64 },
    #[error("media type `{declared}` is not accepted")]
    UnsupportedMediaType { declared: String },
    #[error("no active session")]
    Unauthenticated,
    #[error("storage access denied")]
    AccessDenied,
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("a document already exists under key `{0}`")]
    KeyConflict(String),
    #[error("storage unavailable: {0}")]
    Network(String),
}

impl SubmitError {
    /// Stable machine-readable code, used in diagnostic events and in the
    /// HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::MissingFile => "missing_file",
            SubmitError::FileTooLarge { .. } => "file_too_large",
            SubmitError::UnsupportedMediaType { .. } => "unsupported_media_type",
            SubmitError::Unauthenticated => "unauthenticated",
            SubmitError::AccessDenied => "access_denied",
            SubmitError::QuotaExceeded => "quota_exceeded",
            SubmitError::KeyConflict(_) => "key_conflict",
            SubmitError::Network(_) => "storage_unavailable",
        }
    }

    /// Environment failures that an operator has to look at; a caller
    /// cannot fix these by correcting the request.
    fn escalate_to_operator(&self) -> bool {
        matches!(self, SubmitError::QuotaExceeded | SubmitError::KeyConflict(_))
    }
}

impl From<RejectReason> for SubmitError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::MissingFile => SubmitError::MissingFile,
            RejectReason::FileTooLarge { limit } => SubmitError::FileTooLarge { limit },
            RejectReason::UnsupportedMediaType { declared } => {
                SubmitError::UnsupportedMediaType { declared }
            }
        }
    }
}

impl From<GatewayError> for SubmitError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AccessDenied => SubmitError::AccessDenied,
            GatewayError::QuotaExceeded => SubmitError::QuotaExceeded,
            GatewayError::KeyConflict(key) => SubmitError::KeyConflict(key),
            GatewayError::Network(detail) => SubmitError::Network(detail),
        }
    }
}

/// Composes validator, identity resolver, key generator and storage
/// gateway into one submission operation.
///
/// Holds no cross-request mutable state, so any number of submissions may
/// run concurrently without coordination. Never retries on its own: a
/// retry against the non-overwrite gateway needs a fresh key derivation,
/// which is the caller's decision.
#[derive(Clone)]
pub struct IntakeService {
    gateway: Arc<dyn StorageGateway>,
    identity: IdentityResolver,
    clock: Arc<dyn Clock>,
    limits: AdmissionLimits,
}

impl IntakeService {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        identity: IdentityResolver,
        clock: Arc<dyn Clock>,
        limits: AdmissionLimits,
    ) -> Self {
        Self {
            gateway,
            identity,
            clock,
            limits,
        }
    }

    /// Run one upload through the admission pipeline.
    ///
    /// Validation completes before the session lookup, and both complete
    /// before any storage I/O, so invalid or anonymous requests consume no
    /// storage quota at all.
    pub async fn submit(
        &self,
        token: Option<&str>,
        request: UploadRequest,
    ) -> Result<StoredDocument, SubmitError> {
        let started = Instant::now();
        info!(
            file_name = %request.file_name,
            content_type = %request.content_type,
            declared_size_bytes = request.declared_size_bytes,
            "upload received"
        );

        let outcome = self.run_pipeline(token, request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(document) => {
                info!(
                    outcome = "stored",
                    principal = %document.principal_id,
                    key = %document.storage_key,
                    size_bytes = document.size_bytes,
                    elapsed_ms,
                    "upload stored"
                );
            }
            Err(err) if err.escalate_to_operator() => {
                error!(
                    outcome = "failed",
                    stage = stage_of(err),
                    reason = err.code(),
                    elapsed_ms,
                    "upload failed: {err}"
                );
            }
            Err(err) => {
                warn!(
                    outcome = "failed",
                    stage = stage_of(err),
                    reason = err.code(),
                    elapsed_ms,
                    "upload failed: {err}"
                );
            }
        }

        outcome
    }

    async fn run_pipeline(
        &self,
        token: Option<&str>,
        request: UploadRequest,
    ) -> Result<StoredDocument, SubmitError> {
        // Received -> Validated
        if let ValidationVerdict::Rejected(reason) = validator::validate(&request, &self.limits) {
            return Err(reason.into());
        }

        // Validated -> Authenticated. Must precede key derivation: the key
        // embeds the principal id.
        let principal = self
            .identity
            .resolve(token)
            .await
            .ok_or(SubmitError::Unauthenticated)?;

        // Authenticated -> KeyDerived
        let key = keygen::derive_key(&principal, &request.file_name, self.clock.as_ref());

        // KeyDerived -> Stored. Overwrite is always off: a once-stored
        // document is never silently replaced.
        let document = self
            .gateway
            .put(
                &key,
                request.bytes,
                &request.content_type,
                PutOptions { overwrite: false },
            )
            .await?;

        Ok(document)
    }

    /// Fetch one stored descriptor on behalf of its owner.
    pub async fn fetch(
        &self,
        token: Option<&str>,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, SubmitError> {
        let principal = self
            .identity
            .resolve(token)
            .await
            .ok_or(SubmitError::Unauthenticated)?;
        Ok(self.gateway.lookup(&principal, id).await?)
    }
}

/// Which pipeline stage a failure reason belongs to, for the diagnostic
/// event schema.
fn stage_of(err: &SubmitError) -> &'static str {
    match err {
        SubmitError::MissingFile
        | SubmitError::FileTooLarge { .. }
        | SubmitError::UnsupportedMediaType { .. } => "validate",
        SubmitError::Unauthenticated => "authenticate",
        SubmitError::AccessDenied
        | SubmitError::QuotaExceeded
        | SubmitError::KeyConflict(_)
        | SubmitError::Network(_) => "store",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::principal::{Principal, Session};
    use crate::services::identity::SessionProvider;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{Duration, Utc};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    /// Gateway double: records puts, refuses duplicate keys, counts calls.
    #[derive(Default)]
    struct RecordingGateway {
        puts: AtomicUsize,
        keys: Mutex<HashSet<String>>,
        fail_with: Mutex<Option<GatewayError>>,
    }

    impl RecordingGateway {
        fn failing(err: GatewayError) -> Self {
            Self {
                fail_with: Mutex::new(Some(err)),
                ..Self::default()
            }
        }

        fn put_count(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StorageGateway for RecordingGateway {
        async fn put(
            &self,
            key: &crate::services::keygen::StorageKey,
            bytes: Bytes,
            content_type: &str,
            options: PutOptions,
        ) -> Result<StoredDocument, GatewayError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            assert!(!options.overwrite, "intake must never request overwrite");

            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }

            let mut keys = self.keys.lock().unwrap();
            if !keys.insert(key.as_str().to_string()) {
                return Err(GatewayError::KeyConflict(key.as_str().to_string()));
            }

            let raw = key.as_str();
            let principal_id = raw.split('/').next().unwrap_or_default().to_string();
            Ok(StoredDocument {
                id: Uuid::new_v4(),
                principal_id,
                storage_key: raw.to_string(),
                file_name: "front.jpg".into(),
                content_type: content_type.to_string(),
                size_bytes: bytes.len() as i64,
                etag: format!("{:x}", md5::compute(&bytes)),
                stored_at: Utc::now(),
            })
        }

        async fn lookup(
            &self,
            _principal: &Principal,
            _id: Uuid,
        ) -> Result<Option<StoredDocument>, GatewayError> {
            Ok(None)
        }
    }

    /// Clock that counts reads; lets tests assert no key was derived.
    struct CountingClock {
        base: AtomicI64,
        reads: AtomicUsize,
    }

    impl CountingClock {
        fn starting_at(base: i64) -> Self {
            Self {
                base: AtomicI64::new(base),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl Clock for CountingClock {
        fn now_millis(&self) -> i64 {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.base.fetch_add(1, Ordering::SeqCst)
        }
    }

    struct StaticSessions(Option<Session>);

    #[async_trait]
    impl SessionProvider for StaticSessions {
        async fn current_session(&self, _token: &str) -> Option<Session> {
            self.0.clone()
        }
    }

    fn live_session(principal: &str) -> Option<Session> {
        Some(Session {
            principal_id: principal.into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    fn service(
        gateway: Arc<RecordingGateway>,
        session: Option<Session>,
        clock: Arc<CountingClock>,
    ) -> IntakeService {
        IntakeService::new(
            gateway,
            IdentityResolver::new(Arc::new(StaticSessions(session))),
            clock,
            AdmissionLimits::default(),
        )
    }

    fn jpeg_request(size: usize) -> UploadRequest {
        UploadRequest {
            bytes: Bytes::from(vec![0xAB; size]),
            file_name: "front.jpg".into(),
            content_type: "image/jpeg".into(),
            declared_size_bytes: size as u64,
        }
    }

    #[tokio::test]
    async fn oversized_upload_never_reaches_the_gateway() {
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(0)),
        );

        let mut request = jpeg_request(64);
        request.declared_size_bytes = validator::DEFAULT_MAX_UPLOAD_BYTES + 1;

        let err = svc.submit(Some("token"), request).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::FileTooLarge {
                limit: validator::DEFAULT_MAX_UPLOAD_BYTES
            }
        );
        assert_eq!(gateway.put_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_media_type_is_rejected() {
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(0)),
        );

        let mut request = jpeg_request(64);
        request.content_type = "application/pdf".into();

        let err = svc.submit(Some("token"), request).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::UnsupportedMediaType {
                declared: "application/pdf".into()
            }
        );
        assert_eq!(gateway.put_count(), 0);
    }

    #[tokio::test]
    async fn anonymous_caller_fails_before_key_derivation() {
        let gateway = Arc::new(RecordingGateway::default());
        let clock = Arc::new(CountingClock::starting_at(0));
        let svc = service(gateway.clone(), None, clock.clone());

        let err = svc.submit(Some("token"), jpeg_request(64)).await.unwrap_err();
        assert_eq!(err, SubmitError::Unauthenticated);
        assert_eq!(gateway.put_count(), 0);
        assert_eq!(clock.reads.load(Ordering::SeqCst), 0, "no key was derived");
    }

    #[tokio::test]
    async fn missing_bearer_token_is_unauthenticated() {
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(0)),
        );

        let err = svc.submit(None, jpeg_request(64)).await.unwrap_err();
        assert_eq!(err, SubmitError::Unauthenticated);
        assert_eq!(gateway.put_count(), 0);
    }

    #[tokio::test]
    async fn same_file_name_at_different_ticks_yields_distinct_keys() {
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(1_700_000_000_000)),
        );

        let first = svc.submit(Some("token"), jpeg_request(64)).await.unwrap();
        let second = svc.submit(Some("token"), jpeg_request(64)).await.unwrap();

        assert_ne!(first.storage_key, second.storage_key);
        assert_eq!(gateway.put_count(), 2);
    }

    #[tokio::test]
    async fn replaying_the_same_request_never_reuses_a_key() {
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(1_700_000_000_000)),
        );

        let request = jpeg_request(64);
        let first = svc.submit(Some("token"), request.clone()).await.unwrap();
        let second = svc.submit(Some("token"), request).await.unwrap();

        assert_ne!(first.storage_key, second.storage_key);
    }

    #[tokio::test]
    async fn gateway_conflict_surfaces_without_an_overwrite_retry() {
        let gateway = Arc::new(RecordingGateway::failing(GatewayError::KeyConflict(
            "user-42/1-front.jpg".into(),
        )));
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(0)),
        );

        let err = svc.submit(Some("token"), jpeg_request(64)).await.unwrap_err();
        assert!(matches!(err, SubmitError::KeyConflict(_)));
        assert_eq!(gateway.put_count(), 1, "exactly one attempt, no retry");
    }

    #[tokio::test]
    async fn access_denied_maps_into_the_public_taxonomy() {
        let gateway = Arc::new(RecordingGateway::failing(GatewayError::AccessDenied));
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(0)),
        );

        let err = svc.submit(Some("token"), jpeg_request(64)).await.unwrap_err();
        assert_eq!(err, SubmitError::AccessDenied);
    }

    #[tokio::test]
    async fn accepted_upload_produces_the_documented_descriptor() {
        let gateway = Arc::new(RecordingGateway::default());
        let svc = service(
            gateway.clone(),
            live_session("user-42"),
            Arc::new(CountingClock::starting_at(1_700_000_000_000)),
        );

        let document = svc.submit(Some("token"), jpeg_request(500_000)).await.unwrap();

        assert_eq!(document.storage_key, "user-42/1700000000000-front.jpg");
        assert_eq!(document.principal_id, "user-42");
        assert_eq!(document.size_bytes, 500_000);
        assert_eq!(document.content_type, "image/jpeg");
    }
}
