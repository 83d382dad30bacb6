//! The verification engine: session workflow orchestration.
//!
//! Wires the scoring library to the collaborators (OCR, face detection,
//! cipher, stores) and exposes the session operations an application layer
//! consumes. Document processing runs as a spawned task per upload and marks
//! its own record `Failed` on error; it never crashes the session. Status
//! transitions are serialized per session through an async mutex registry,
//! so a sweep and a completion racing the same session resolve to whichever
//! transition lands first.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use image::DynamicImage;
use serde::Serialize;
use sha3::{Digest, Sha3_256};
use tokio::sync::Mutex;
use uuid::Uuid;

use verid_core::{
    analysis, document, state, ChallengeType, Document, DocumentKind, ExtractedData,
    FaceComparator, FaceDetector, FaceMatch, FusionReport, LivenessEvaluator, LivenessResult,
    Session, SessionStatus, TextExtractor, VerificationType, Verdict,
};

use crate::config::EngineConfig;
use crate::crypto::BlobCipher;
use crate::error::{EngineError, Result};
use crate::store::memory::{
    MemoryDocumentStore, MemoryFaceMatchStore, MemoryLivenessStore, MemorySessionStore,
};
use crate::store::{DocumentStore, FaceMatchStore, LivenessStore, SessionStore};

/// The persistence backends the engine runs over.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub face_matches: Arc<dyn FaceMatchStore>,
    pub liveness: Arc<dyn LivenessStore>,
}

impl Stores {
    /// In-memory backends, for tests and ephemeral deployments.
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            face_matches: Arc::new(MemoryFaceMatchStore::new()),
            liveness: Arc::new(MemoryLivenessStore::new()),
        }
    }
}

/// Point-in-time read of everything recorded against a session.
struct Snapshot {
    session: Session,
    documents: Vec<Document>,
    extracted: Vec<ExtractedData>,
    matches: Vec<FaceMatch>,
    liveness: Vec<LivenessResult>,
}

#[derive(Clone)]
pub struct VerificationEngine {
    config: EngineConfig,
    cipher: Arc<dyn BlobCipher>,
    ocr: Arc<dyn TextExtractor>,
    detector: Arc<dyn FaceDetector>,
    stores: Stores,
    /// Per-session transition locks (single writer per session).
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl VerificationEngine {
    pub fn new(
        config: EngineConfig,
        cipher: Arc<dyn BlobCipher>,
        ocr: Arc<dyn TextExtractor>,
        detector: Arc<dyn FaceDetector>,
        stores: Stores,
    ) -> Self {
        Self {
            config,
            cipher,
            ocr,
            detector,
            stores,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Open a new verification session. The caller's user reference is
    /// hashed before storage; the raw value never persists.
    pub async fn create_session(
        &self,
        user_ref: &str,
        verification_type: VerificationType,
    ) -> Result<Session> {
        let expires_at = Utc::now() + Duration::hours(self.config.session_expiry_hours);
        let mut session = Session::new(sha3_hex(user_ref.as_bytes()), verification_type, expires_at);

        let creation = serde_json::json!({
            "verificationType": format!("{verification_type:?}"),
            "createdAt": session.created_at.to_rfc3339(),
        });
        session.metadata_enc = Some(self.encrypt_json(&creation)?);

        self.stores.sessions.insert(session.clone()).await?;
        tracing::info!(
            session_id = %session.id,
            verification_type = ?verification_type,
            expires_at = %expires_at,
            "session created"
        );
        Ok(session)
    }

    /// Record a document upload and dispatch its processing.
    ///
    /// Returns the `Pending` record immediately; a spawned task runs
    /// OCR, extraction and validation, then writes the terminal record and
    /// advances the session.
    pub async fn record_document(
        &self,
        session_id: Uuid,
        kind: DocumentKind,
        image_bytes: Vec<u8>,
    ) -> Result<Document> {
        self.require_evidence_window(session_id).await?;

        let storage_ref = format!("sha3:{}", sha3_hex(&image_bytes));
        let document = Document::new(session_id, kind, self.cipher.encrypt(&storage_ref)?);
        self.stores.documents.insert(document.clone()).await?;

        self.try_advance(session_id, SessionStatus::InProgress).await?;

        let engine = self.clone();
        let document_id = document.id;
        tokio::spawn(async move {
            engine.process_document(document_id, kind, image_bytes).await;
        });

        tracing::info!(session_id = %session_id, document_id = %document.id, kind = %kind, "document recorded");
        Ok(document)
    }

    /// The spawned document pipeline. Collaborator and system errors mark
    /// this record `Failed`; they must not propagate.
    async fn process_document(&self, document_id: Uuid, kind: DocumentKind, image_bytes: Vec<u8>) {
        if let Err(e) = self.run_document_pipeline(document_id, kind, &image_bytes).await {
            tracing::warn!(document_id = %document_id, error = %e, "document processing failed");
            self.mark_document_failed(document_id, &e.to_string()).await;
        }
    }

    async fn run_document_pipeline(
        &self,
        document_id: Uuid,
        kind: DocumentKind,
        image_bytes: &[u8],
    ) -> Result<()> {
        let started = Instant::now();
        let ocr_output = self
            .ocr
            .extract_text(image_bytes)
            .await
            .map_err(|e| EngineError::Collaborator(e.to_string()))?;

        let extracted = document::extract(kind, &ocr_output.text);
        let validation = document::validate(kind, &extracted, self.config.ocr_threshold);

        let mut document = self
            .stores
            .documents
            .get(document_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("document {document_id}")))?;
        let session_id = document.session_id;

        document
            .metadata
            .insert("ocrConfidence".into(), ocr_output.confidence.into());
        document.metadata.insert(
            "processingMs".into(),
            (started.elapsed().as_millis() as u64).into(),
        );
        if validation.valid {
            document.processing_status = verid_core::ProcessingStatus::Completed;
            document.confidence_score = Some(validation.confidence_score);
            document.extracted_enc = Some(self.encrypt_json(&extracted)?);
        } else {
            document.processing_status = verid_core::ProcessingStatus::Rejected;
            document.metadata.insert(
                "errors".into(),
                serde_json::Value::from(validation.errors.clone()),
            );
        }
        document.processed_at = Some(Utc::now());
        self.stores.documents.update(document).await?;

        if validation.valid {
            self.try_advance(session_id, SessionStatus::DocumentVerified)
                .await?;
            tracing::info!(
                document_id = %document_id,
                confidence = validation.confidence_score,
                "document validated"
            );
        } else {
            tracing::info!(
                document_id = %document_id,
                errors = ?validation.errors,
                "document rejected"
            );
        }
        Ok(())
    }

    async fn mark_document_failed(&self, document_id: Uuid, error: &str) {
        let loaded = self.stores.documents.get(document_id).await;
        let Ok(Some(mut document)) = loaded else {
            tracing::error!(document_id = %document_id, "failed document record unreachable");
            return;
        };
        document.processing_status = verid_core::ProcessingStatus::Failed;
        document.metadata.insert("error".into(), error.into());
        document.processed_at = Some(Utc::now());
        if let Err(e) = self.stores.documents.update(document).await {
            tracing::error!(document_id = %document_id, error = %e, "could not persist failure");
        }
    }

    /// Compare a live capture against the face on a previously recorded
    /// document. Raw images are never stored, so the caller supplies the
    /// reference image bytes along with the document they came from.
    pub async fn record_face_capture(
        &self,
        session_id: Uuid,
        reference_document_id: Uuid,
        reference_bytes: &[u8],
        live_bytes: &[u8],
    ) -> Result<FaceMatch> {
        self.require_evidence_window(session_id).await?;

        let reference_doc = self
            .stores
            .documents
            .get(reference_document_id)
            .await?
            .filter(|d| d.session_id == session_id)
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "document {reference_document_id} in session {session_id}"
                ))
            })?;

        let started = Instant::now();
        let reference_image = analysis::decode_image(reference_bytes)?;
        let live_image = analysis::decode_image(live_bytes)?;

        let reference_face = self.primary_face(&reference_image, "reference").await?;
        let live_face = self.primary_face(&live_image, "live").await?;

        let comparison = FaceComparator::new(self.config.face_match_threshold).compare(
            &reference_image,
            &live_image,
            &reference_face,
            &live_face,
        )?;

        let face_match = FaceMatch {
            id: Uuid::new_v4(),
            session_id,
            reference_document_id: reference_doc.id,
            live_capture_ref: format!("sha3:{}", sha3_hex(live_bytes)),
            match_score: comparison.match_score,
            is_match: comparison.is_match,
            confidence_level: comparison.confidence_level,
            quality_score: comparison.quality_score,
            anti_spoofing_score: comparison.anti_spoofing_score,
            algorithm: comparison.algorithm,
            processing_ms: started.elapsed().as_millis() as u64,
            metadata_enc: Some(self.encrypt_json(&comparison)?),
            created_at: Utc::now(),
        };
        self.stores.face_matches.insert(face_match.clone()).await?;
        self.try_advance(session_id, SessionStatus::InProgress).await?;

        tracing::info!(
            session_id = %session_id,
            match_score = face_match.match_score,
            is_match = face_match.is_match,
            algorithm = ?face_match.algorithm,
            "face capture recorded"
        );
        Ok(face_match)
    }

    async fn primary_face(
        &self,
        image: &DynamicImage,
        context: &'static str,
    ) -> Result<verid_core::DetectedFace> {
        let faces = self.detector.detect_faces(image).await?;
        Ok(verid_core::select_primary_face(image, faces, context)?)
    }

    /// Evaluate a liveness challenge over the submitted frames and record
    /// the result. Out-of-window durations and borderline scores are stored
    /// flagged for review, not rejected.
    pub async fn record_liveness_sample(
        &self,
        session_id: Uuid,
        challenge: ChallengeType,
        frames: &[Vec<u8>],
        media_duration_secs: Option<u32>,
    ) -> Result<LivenessResult> {
        self.require_evidence_window(session_id).await?;

        let started = Instant::now();
        let images = frames
            .iter()
            .map(|bytes| analysis::decode_image(bytes))
            .collect::<verid_core::Result<Vec<DynamicImage>>>()?;

        let evaluation =
            LivenessEvaluator::new(self.config.liveness_threshold).evaluate(challenge, &images)?;

        let mut result = LivenessResult {
            id: Uuid::new_v4(),
            session_id,
            challenge,
            is_live: evaluation.is_live,
            liveness_score: evaluation.liveness_score,
            confidence_level: evaluation.confidence_level,
            media_duration_secs,
            processing_ms: started.elapsed().as_millis() as u64,
            checks_passed: evaluation.checks_passed,
            checks_total: evaluation.checks_total,
            analysis_enc: Some(self.encrypt_json(&evaluation)?),
            needs_review: false,
            created_at: Utc::now(),
        };
        result.needs_review = result.compute_needs_review();

        self.stores.liveness.insert(result.clone()).await?;
        self.try_advance(session_id, SessionStatus::InProgress).await?;

        tracing::info!(
            session_id = %session_id,
            challenge = %challenge,
            is_live = result.is_live,
            needs_review = result.needs_review,
            "liveness sample recorded"
        );
        Ok(result)
    }

    /// Read-only fusion over a snapshot of the session's evidence.
    pub async fn validate(&self, session_id: Uuid) -> Result<FusionReport> {
        let snapshot = self.snapshot(session_id).await?;
        Ok(self.fuse_snapshot(&snapshot))
    }

    /// Run fusion and apply the verdict as a terminal (or review) transition.
    ///
    /// Errors without mutation when the session is already terminal or a
    /// required modality has no recorded result. Re-running against a
    /// session already parked in review with an unchanged verdict is a
    /// no-op; a reviewer resolves it by re-calling once the evidence
    /// changes the verdict. A system failure mid-completion marks the
    /// session `Failed` instead of leaving it in flight.
    pub async fn complete(
        &self,
        session_id: Uuid,
        completed_by: &str,
        notes: Option<&str>,
    ) -> Result<Session> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let snapshot = self.snapshot(session_id).await?;
        let session = &snapshot.session;
        if session.status.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "session {session_id} is already {}",
                session.status
            )));
        }
        self.require_completable(&snapshot)?;

        match self.apply_completion(snapshot, completed_by, notes).await {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "completion failed");
                // The Failed fallback is for system errors mid-completion. A
                // transition refusal is the state machine speaking; it must
                // not destroy the session it protected.
                if !matches!(
                    e,
                    EngineError::Core(verid_core::VeridError::InvalidTransition { .. })
                ) {
                    self.mark_session_failed(session_id, &e.to_string()).await;
                }
                Err(e)
            }
        }
    }

    async fn apply_completion(
        &self,
        snapshot: Snapshot,
        completed_by: &str,
        notes: Option<&str>,
    ) -> Result<Session> {
        let report = self.fuse_snapshot(&snapshot);
        let mut session = snapshot.session;

        let target = match report.verdict {
            Verdict::Approved => SessionStatus::Approved,
            Verdict::Rejected => SessionStatus::Rejected,
            Verdict::NeedsReview => SessionStatus::PendingReview,
        };
        if session.status == target {
            // Unchanged evidence reached the same verdict again; a session
            // parked in review stays parked until the evidence (or a human)
            // says otherwise.
            return Ok(session);
        }
        state::transition(&mut session, target)?;

        session.confidence_score = report.fused_score;
        session.failure_reason = report.failure_reason.clone();
        if session.status.is_terminal() {
            session.completed_at = Some(Utc::now());
        }
        let completion = serde_json::json!({
            "completedBy": completed_by,
            "notes": notes,
            "verdict": report.verdict,
        });
        // Merge into the existing metadata; the creation entry stays.
        let mut metadata = match &session.metadata_enc {
            Some(blob) => {
                let json = self.cipher.decrypt(blob)?;
                serde_json::from_str::<serde_json::Value>(&json).map_err(|e| {
                    EngineError::encryption(format!("corrupt session metadata: {e}"))
                })?
            }
            None => serde_json::json!({}),
        };
        if let Some(object) = metadata.as_object_mut() {
            object.insert("completion".into(), completion);
        }
        session.metadata_enc = Some(self.encrypt_json(&metadata)?);

        self.stores.sessions.update(session.clone()).await?;
        tracing::info!(
            session_id = %session.id,
            verdict = ?report.verdict,
            fused_score = ?report.fused_score,
            "session completed"
        );
        Ok(session)
    }

    fn require_completable(&self, snapshot: &Snapshot) -> Result<()> {
        let vt = snapshot.session.verification_type;
        let mut missing = Vec::new();
        if vt.requires_documents() && snapshot.documents.is_empty() {
            missing.push("document");
        }
        if vt.requires_face_match() && snapshot.matches.is_empty() {
            missing.push("face capture");
        }
        if vt.requires_liveness() && snapshot.liveness.is_empty() {
            missing.push("liveness sample");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::invalid_state(format!(
                "session {} cannot be completed: no recorded {}",
                snapshot.session.id,
                missing.join(", ")
            )))
        }
    }

    async fn mark_session_failed(&self, session_id: Uuid, reason: &str) {
        let Ok(Some(mut session)) = self.stores.sessions.get(session_id).await else {
            return;
        };
        if state::transition(&mut session, SessionStatus::Failed).is_ok() {
            session.failure_reason = Some(reason.to_string());
            session.completed_at = Some(Utc::now());
            if let Err(e) = self.stores.sessions.update(session).await {
                tracing::error!(session_id = %session_id, error = %e, "could not persist failure");
            }
        }
    }

    /// Abort a non-terminal session at the user's request.
    pub async fn cancel(&self, session_id: Uuid, reason: &str) -> Result<Session> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        state::transition(&mut session, SessionStatus::Cancelled)?;
        session.failure_reason = Some(reason.to_string());
        self.stores.sessions.update(session.clone()).await?;
        tracing::info!(session_id = %session_id, reason = reason, "session cancelled");
        Ok(session)
    }

    /// Expire sessions past their deadline. Tolerates racing an in-flight
    /// completion: a session that went terminal since the scan is skipped.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let candidates = self.stores.sessions.find_expired_non_terminal(now).await?;

        let mut swept = 0;
        for candidate in candidates {
            let lock = self.session_lock(candidate.id);
            let _guard = lock.lock().await;

            let Some(mut session) = self.stores.sessions.get(candidate.id).await? else {
                continue;
            };
            if session.status.is_terminal() || !session.is_expired(now) {
                continue;
            }
            if state::transition(&mut session, SessionStatus::Expired).is_ok() {
                self.stores.sessions.update(session).await?;
                swept += 1;
            }
        }
        if swept > 0 {
            tracing::info!(count = swept, "expired sessions swept");
        }
        Ok(swept)
    }

    /// Erase a session and everything recorded against it.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.load_session(session_id).await?;

        self.stores.documents.delete_by_session(session_id).await?;
        self.stores.face_matches.delete_by_session(session_id).await?;
        self.stores.liveness.delete_by_session(session_id).await?;
        self.stores.sessions.delete(session_id).await?;
        self.locks.remove(&session_id);

        tracing::info!(session_id = %session_id, "session deleted");
        Ok(())
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Session> {
        self.load_session(session_id).await
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Session> {
        self.stores
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("session {session_id}")))
    }

    async fn require_evidence_window(&self, session_id: Uuid) -> Result<Session> {
        let session = self.load_session(session_id).await?;
        if !session.accepts_evidence(Utc::now()) {
            return Err(EngineError::invalid_state(format!(
                "session {session_id} no longer accepts evidence (status {}, expires {})",
                session.status, session.expires_at
            )));
        }
        Ok(session)
    }

    async fn snapshot(&self, session_id: Uuid) -> Result<Snapshot> {
        let session = self.load_session(session_id).await?;
        let documents = self.stores.documents.find_by_session(session_id).await?;
        let matches = self.stores.face_matches.find_by_session(session_id).await?;
        let liveness = self.stores.liveness.find_by_session(session_id).await?;

        let mut extracted = Vec::new();
        for doc in &documents {
            if let Some(blob) = &doc.extracted_enc {
                let json = self.cipher.decrypt(blob)?;
                let data: ExtractedData = serde_json::from_str(&json).map_err(|e| {
                    EngineError::encryption(format!("corrupt extracted payload: {e}"))
                })?;
                extracted.push(data);
            }
        }

        Ok(Snapshot {
            session,
            documents,
            extracted,
            matches,
            liveness,
        })
    }

    fn fuse_snapshot(&self, snapshot: &Snapshot) -> FusionReport {
        verid_core::fuse(
            &snapshot.session,
            &snapshot.documents,
            &snapshot.extracted,
            &snapshot.matches,
            &snapshot.liveness,
            self.config.fusion_thresholds(),
        )
    }

    /// Apply a mid-workflow transition if it is currently legal; an already
    /// advanced session is not an error here.
    async fn try_advance(&self, session_id: Uuid, to: SessionStatus) -> Result<()> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        if state::allowed(session.status, to) {
            state::transition(&mut session, to)?;
            self.stores.sessions.update(session).await?;
            tracing::debug!(session_id = %session_id, status = %to, "session advanced");
        }
        Ok(())
    }

    fn session_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_string(value)
            .map_err(|e| EngineError::encryption(format!("serialization failed: {e}")))?;
        self.cipher.encrypt(&json)
    }
}

fn sha3_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PassthroughCipher;
    use verid_core::{MockFaceDetector, MockTextExtractor};

    fn engine() -> VerificationEngine {
        VerificationEngine::new(
            EngineConfig::default(),
            Arc::new(PassthroughCipher),
            Arc::new(MockTextExtractor::new("", 0.9)),
            Arc::new(MockFaceDetector::empty()),
            Stores::in_memory(),
        )
    }

    #[test]
    fn test_user_ref_is_pseudonymized() {
        let digest = sha3_hex(b"user-42");
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, "user-42");
        assert_eq!(digest, sha3_hex(b"user-42"));
    }

    #[tokio::test]
    async fn test_create_session_never_stores_raw_ref() {
        let engine = engine();
        let session = engine
            .create_session("user-42", VerificationType::Full)
            .await
            .unwrap();
        assert!(!session.user_ref.contains("user-42"));
        assert_eq!(session.user_ref, sha3_hex(b"user-42"));
        assert_eq!(session.status, SessionStatus::Initiated);
    }

    #[tokio::test]
    async fn test_cancel_then_cancel_again_fails() {
        let engine = engine();
        let session = engine
            .create_session("user-42", VerificationType::Full)
            .await
            .unwrap();

        let cancelled = engine.cancel(session.id, "user abandoned").await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert_eq!(cancelled.failure_reason.as_deref(), Some("user abandoned"));

        assert!(matches!(
            engine.cancel(session.id, "again").await,
            Err(EngineError::Core(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.validate(Uuid::new_v4()).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_requires_recorded_evidence() {
        let engine = engine();
        let session = engine
            .create_session("user-42", VerificationType::DocumentOnly)
            .await
            .unwrap();
        let err = engine.complete(session.id, "reviewer", None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        // The guard must not have mutated the session.
        let reloaded = engine.get_session(session.id).await.unwrap();
        assert_eq!(reloaded.status, SessionStatus::Initiated);
    }
}
