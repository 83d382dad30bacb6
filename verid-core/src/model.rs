//! Entities of an identity-verification session.
//!
//! A [`Session`] owns the evidence recorded against it: [`Document`]s,
//! [`FaceMatch`]es and [`LivenessResult`]s. Evidence records are immutable
//! once written with a terminal processing status; the session itself is only
//! mutated through the state machine (see [`crate::state`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which modalities a session must collect before it can be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationType {
    /// Document checks only.
    DocumentOnly,
    /// Face comparison only.
    FaceOnly,
    /// Documents + face match + liveness.
    Full,
    /// Full verification with a widened manual-review band.
    Enhanced,
}

impl VerificationType {
    pub fn requires_documents(self) -> bool {
        matches!(self, Self::DocumentOnly | Self::Full | Self::Enhanced)
    }

    pub fn requires_face_match(self) -> bool {
        matches!(self, Self::FaceOnly | Self::Full | Self::Enhanced)
    }

    pub fn requires_liveness(self) -> bool {
        matches!(self, Self::Full | Self::Enhanced)
    }
}

/// Session lifecycle states. Transitions are enforced by [`crate::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Initiated,
    InProgress,
    DocumentVerified,
    PendingReview,
    Completed,
    Approved,
    Rejected,
    Failed,
    Expired,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Approved
                | Self::Rejected
                | Self::Failed
                | Self::Expired
                | Self::Cancelled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initiated => "INITIATED",
            Self::InProgress => "IN_PROGRESS",
            Self::DocumentVerified => "DOCUMENT_VERIFIED",
            Self::PendingReview => "PENDING_REVIEW",
            Self::Completed => "COMPLETED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// One identity-verification unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// SHA3-256 hex digest of the caller-supplied user reference.
    /// The raw reference is never stored.
    pub user_ref: String,
    pub verification_type: VerificationType,
    pub status: SessionStatus,
    /// Workflow progress percentage, clamped to 0..=100.
    pub progress: u8,
    /// Fused confidence score, set at completion.
    pub confidence_score: Option<f64>,
    /// Human-readable reason for a rejected or failed session.
    pub failure_reason: Option<String>,
    /// Encrypted session metadata blob (opaque to the engine).
    pub metadata_enc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        user_ref: String,
        verification_type: VerificationType,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        debug_assert!(expires_at > now);
        Self {
            id: Uuid::new_v4(),
            user_ref,
            verification_type,
            status: SessionStatus::Initiated,
            // Initiated reports 10%, see state::progress_for.
            progress: 10,
            confidence_score: None,
            failure_reason: None,
            metadata_enc: None,
            created_at: now,
            updated_at: now,
            expires_at,
            completed_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Uploads are accepted while the session is live and not expired.
    pub fn accepts_evidence(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && !self.is_expired(now)
    }

    pub fn set_progress(&mut self, percentage: u8) {
        self.progress = percentage.min(100);
        self.updated_at = Utc::now();
    }
}

/// Kind of an uploaded identity document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Passport,
    IdCard,
    IdCardFront,
    IdCardBack,
    DrivingLicense,
    DrivingLicenseFront,
    DrivingLicenseBack,
    Other,
}

impl DocumentKind {
    /// Collapse front/back variants onto the base kind used for extraction.
    pub fn base(self) -> DocumentKind {
        match self {
            Self::IdCardFront | Self::IdCardBack => Self::IdCard,
            Self::DrivingLicenseFront | Self::DrivingLicenseBack => Self::DrivingLicense,
            other => other,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Passport => "passport",
            Self::IdCard => "id-card",
            Self::IdCardFront => "id-card-front",
            Self::IdCardBack => "id-card-back",
            Self::DrivingLicense => "driving-license",
            Self::DrivingLicenseFront => "driving-license-front",
            Self::DrivingLicenseBack => "driving-license-back",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }
}

/// One uploaded identity artifact and its extraction outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: DocumentKind,
    /// Encrypted storage reference for the raw upload.
    pub storage_ref_enc: String,
    pub processing_status: ProcessingStatus,
    /// Encrypted JSON of the extracted structured fields.
    pub extracted_enc: Option<String>,
    /// Extraction confidence; `Some` only once processing completed.
    pub confidence_score: Option<f64>,
    /// Free-form processing metadata (errors, durations).
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(session_id: Uuid, kind: DocumentKind, storage_ref_enc: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            kind,
            storage_ref_enc,
            processing_status: ProcessingStatus::Pending,
            extracted_enc: None,
            confidence_score: None,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Algorithm that produced a face comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchAlgorithm {
    /// Model-supplied embedding vectors.
    Embedding,
    /// Gradient-statistics fallback when no embedding model is available.
    GradientStats,
}

/// Result of comparing a live capture against a reference document face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMatch {
    pub id: Uuid,
    pub session_id: Uuid,
    pub reference_document_id: Uuid,
    /// Audit reference (hash) of the live capture; raw pixels are not stored.
    pub live_capture_ref: String,
    /// Raw blended similarity in [0, 1].
    pub match_score: f64,
    /// Decision at the threshold in force when the comparison ran. Stored
    /// beside the raw score so threshold changes don't force recomputation.
    pub is_match: bool,
    pub confidence_level: f64,
    pub quality_score: f64,
    pub anti_spoofing_score: f64,
    pub algorithm: MatchAlgorithm,
    pub processing_ms: u64,
    /// Encrypted comparison metadata.
    pub metadata_enc: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Liveness challenge families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeType {
    Passive,
    Blink,
    HeadTurn,
    Smile,
    ChallengeResponse,
}

impl std::fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Passive => "passive",
            Self::Blink => "blink",
            Self::HeadTurn => "head-turn",
            Self::Smile => "smile",
            Self::ChallengeResponse => "challenge-response",
        };
        write!(f, "{name}")
    }
}

/// Media duration window accepted as liveness evidence, in seconds.
pub const LIVENESS_DURATION_SECS: std::ops::RangeInclusive<u32> = 2..=30;

/// Result of one liveness challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResult {
    pub id: Uuid,
    pub session_id: Uuid,
    pub challenge: ChallengeType,
    pub is_live: bool,
    pub liveness_score: f64,
    pub confidence_level: f64,
    /// Duration of the submitted media, when known.
    pub media_duration_secs: Option<u32>,
    pub processing_ms: u64,
    pub checks_passed: u8,
    pub checks_total: u8,
    /// Encrypted analysis details.
    pub analysis_enc: Option<String>,
    /// Flagged for manual review (out-of-window duration, borderline score,
    /// abnormal processing time). The record is still stored.
    pub needs_review: bool,
    pub created_at: DateTime<Utc>,
}

impl LivenessResult {
    pub fn duration_in_window(&self) -> bool {
        self.media_duration_secs
            .map(|d| LIVENESS_DURATION_SECS.contains(&d))
            .unwrap_or(false)
    }

    /// Review heuristics carried over from operator experience: borderline
    /// scores, odd durations and slow processing all warrant a second look.
    pub fn compute_needs_review(&self) -> bool {
        let borderline = (0.4..=0.6).contains(&self.liveness_score);
        let bad_duration = self
            .media_duration_secs
            .map(|d| !LIVENESS_DURATION_SECS.contains(&d))
            .unwrap_or(false);
        let slow = self.processing_ms > 15_000;
        borderline || bad_duration || slow
    }
}
