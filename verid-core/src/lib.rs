//! Verid Core - Identity-verification scoring and decision library
//!
//! This crate holds the pure decision logic of a verification session:
//! the data model and state machine, the per-modality validators (documents,
//! face comparison, liveness) and the confidence fusion that turns recorded
//! evidence into a verdict. Nothing here performs I/O beyond image decoding;
//! OCR and face detection are collaborator traits with deterministic mocks.
//!
//! # Example
//!
//! ```
//! use verid_core::{
//!     fuse, FusionThresholds, Session, VerificationType, Verdict,
//! };
//! use chrono::{Duration, Utc};
//!
//! let session = Session::new(
//!     "a3f1…user-hash".to_string(),
//!     VerificationType::DocumentOnly,
//!     Utc::now() + Duration::hours(24),
//! );
//!
//! // No evidence recorded yet: fusion has nothing to average.
//! let report = fuse(&session, &[], &[], &[], &[], FusionThresholds::default());
//! assert_eq!(report.verdict, Verdict::Rejected);
//! assert!(report.fused_score.is_none());
//! ```

pub mod analysis;
pub mod document;
pub mod error;
pub mod face;
pub mod fusion;
pub mod liveness;
pub mod model;
pub mod state;
pub mod vision;

// Re-export main types for convenience
pub use document::{ExtractedData, ValidationResult};
pub use error::{Result, VeridError};
pub use face::{FaceComparator, FaceComparison, FeatureVector};
pub use fusion::{
    fuse, Component, ComponentValidation, FusionReport, FusionThresholds, ValidationSummary,
    Verdict,
};
pub use liveness::{LivenessAnalysis, LivenessCheck, LivenessEvaluator};
pub use model::{
    ChallengeType, Document, DocumentKind, FaceMatch, LivenessResult, MatchAlgorithm,
    ProcessingStatus, Session, SessionStatus, VerificationType, LIVENESS_DURATION_SECS,
};
pub use vision::{
    select_primary_face, DetectedFace, ExtractedText, FaceBox, FaceDetector, MockFaceDetector,
    MockTextExtractor, TextExtractor,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    /// Integration test: extract a document, validate it, fuse, and walk the
    /// session to a verdict.
    #[test]
    fn test_document_only_workflow() {
        let mut session = Session::new(
            "hash".to_string(),
            VerificationType::DocumentOnly,
            Utc::now() + Duration::hours(24),
        );

        let text = "Passport No: X1234567\nSurname: MARTIN\nGiven names: CLAIRE\n\
                    Date of birth: 14/03/1990\nDate of expiry: 14/03/2031\n";
        let extracted = document::extract(DocumentKind::Passport, text);
        let validation = document::validate(DocumentKind::Passport, &extracted, 0.7);
        assert!(validation.valid);

        let mut doc = Document::new(session.id, DocumentKind::Passport, "ref".to_string());
        doc.processing_status = ProcessingStatus::Completed;
        doc.confidence_score = Some(validation.confidence_score);
        doc.processed_at = Some(Utc::now());

        state::transition(&mut session, SessionStatus::InProgress).unwrap();
        state::transition(&mut session, SessionStatus::DocumentVerified).unwrap();

        let report = fuse(
            &session,
            std::slice::from_ref(&doc),
            std::slice::from_ref(&extracted),
            &[],
            &[],
            FusionThresholds::default(),
        );
        assert_eq!(report.verdict, Verdict::Approved);

        state::transition(&mut session, SessionStatus::Approved).unwrap();
        assert_eq!(session.progress, 100);
    }

    /// A face match recorded without any is_match decision drags the whole
    /// session to rejection even when documents are perfect.
    #[test]
    fn test_failed_face_component_rejects_session() {
        let session = Session::new(
            "hash".to_string(),
            VerificationType::Full,
            Utc::now() + Duration::hours(24),
        );

        let mut doc = Document::new(session.id, DocumentKind::Passport, "ref".to_string());
        doc.processing_status = ProcessingStatus::Completed;
        doc.confidence_score = Some(0.95);

        let face = FaceMatch {
            id: Uuid::new_v4(),
            session_id: session.id,
            reference_document_id: doc.id,
            live_capture_ref: "hash".to_string(),
            match_score: 0.4,
            is_match: false,
            confidence_level: 0.5,
            quality_score: 0.9,
            anti_spoofing_score: 0.8,
            algorithm: MatchAlgorithm::GradientStats,
            processing_ms: 30,
            metadata_enc: None,
            created_at: Utc::now(),
        };

        let report = fuse(
            &session,
            std::slice::from_ref(&doc),
            &[],
            std::slice::from_ref(&face),
            &[],
            FusionThresholds::default(),
        );
        assert_eq!(report.verdict, Verdict::Rejected);
        assert!(report.failure_reason.unwrap().contains("face match"));
    }
}
