//! Confidence fusion across modalities.
//!
//! Each modality that recorded results is validated into a
//! [`ComponentValidation`]; the fused score is a weighted average over the
//! components that ran. Temporal consistency is validated alongside but
//! carries no fusion weight: it gates validity, not the score.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::document::{self, ExtractedData};
use crate::model::{
    Document, FaceMatch, LivenessResult, ProcessingStatus, Session, VerificationType,
};

pub const WEIGHT_DOCUMENT: f64 = 0.4;
pub const WEIGHT_FACE: f64 = 0.4;
pub const WEIGHT_LIVENESS: f64 = 0.2;

/// Slack added to the session window when checking evidence timestamps.
pub const EVIDENCE_TOLERANCE_MINS: i64 = 5;
/// Maximum gap between the latest liveness and face-match evidence.
pub const MODALITY_GAP_MINS: i64 = 30;

/// Half-width of the manual-review band around the global threshold.
pub const REVIEW_BAND: f64 = 0.05;
/// Enhanced sessions get a wider band: more goes to a human.
pub const REVIEW_BAND_ENHANCED: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Documents,
    FaceMatch,
    Liveness,
    Temporal,
}

impl Component {
    fn label(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::FaceMatch => "face match",
            Self::Liveness => "liveness",
            Self::Temporal => "temporal consistency",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentValidation {
    pub component: Component,
    pub valid: bool,
    pub confidence_score: f64,
    pub errors: Vec<String>,
}

/// Point-in-time validation of everything recorded against a session.
/// A `None` component did not run (no results of that modality).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub document: Option<ComponentValidation>,
    pub face: Option<ComponentValidation>,
    pub liveness: Option<ComponentValidation>,
    pub temporal: ComponentValidation,
}

impl ValidationSummary {
    /// Every component that ran is valid, temporal included.
    pub fn all_valid(&self) -> bool {
        [&self.document, &self.face, &self.liveness]
            .into_iter()
            .flatten()
            .all(|c| c.valid)
            && self.temporal.valid
    }

    fn failing(&self) -> impl Iterator<Item = &ComponentValidation> {
        [&self.document, &self.face, &self.liveness]
            .into_iter()
            .flatten()
            .chain(std::iter::once(&self.temporal))
            .filter(|c| !c.valid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Approved,
    Rejected,
    NeedsReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionReport {
    pub summary: ValidationSummary,
    /// Weighted average over the modalities that ran; `None` when none did.
    pub fused_score: Option<f64>,
    pub verdict: Verdict,
    pub failure_reason: Option<String>,
}

/// Thresholds in force for one fusion run.
#[derive(Debug, Clone, Copy)]
pub struct FusionThresholds {
    pub face_match: f64,
    pub liveness: f64,
    pub global: f64,
}

impl Default for FusionThresholds {
    fn default() -> Self {
        Self {
            face_match: 0.8,
            liveness: 0.7,
            global: 0.85,
        }
    }
}

/// Validate the document modality. `extracted` holds the decrypted field
/// maps of the completed documents, for cross-document consistency.
pub fn validate_documents(
    documents: &[Document],
    extracted: &[ExtractedData],
) -> Option<ComponentValidation> {
    if documents.is_empty() {
        return None;
    }

    let mut errors = Vec::new();
    let completed: Vec<&Document> = documents
        .iter()
        .filter(|d| d.processing_status == ProcessingStatus::Completed)
        .collect();

    if completed.is_empty() {
        errors.push("no successfully processed document".to_string());
    }
    errors.extend(document::cross_document_consistency(extracted));

    let confidence = if completed.is_empty() {
        0.0
    } else {
        completed
            .iter()
            .filter_map(|d| d.confidence_score)
            .sum::<f64>()
            / completed.len() as f64
    };

    Some(ComponentValidation {
        component: Component::Documents,
        valid: errors.is_empty(),
        confidence_score: confidence,
        errors,
    })
}

pub fn validate_face_matches(
    matches: &[FaceMatch],
    threshold: f64,
) -> Option<ComponentValidation> {
    if matches.is_empty() {
        return None;
    }

    let mut errors = Vec::new();
    let best = matches
        .iter()
        .map(|m| m.match_score)
        .fold(0.0f64, f64::max);

    if !matches.iter().any(|m| m.is_match) {
        errors.push("no successful face match".to_string());
    }
    if best < threshold {
        errors.push(format!(
            "best match score {best:.2} below threshold {threshold:.2}"
        ));
    }

    Some(ComponentValidation {
        component: Component::FaceMatch,
        valid: errors.is_empty(),
        confidence_score: best,
        errors,
    })
}

pub fn validate_liveness(
    results: &[LivenessResult],
    threshold: f64,
) -> Option<ComponentValidation> {
    if results.is_empty() {
        return None;
    }

    let mut errors = Vec::new();
    let best = results
        .iter()
        .map(|r| r.liveness_score)
        .fold(0.0f64, f64::max);

    if !results.iter().any(|r| r.is_live) {
        errors.push("no live capture detected".to_string());
    }
    if best < threshold {
        errors.push(format!(
            "best liveness score {best:.2} below threshold {threshold:.2}"
        ));
    }

    Some(ComponentValidation {
        component: Component::Liveness,
        valid: errors.is_empty(),
        confidence_score: best,
        errors,
    })
}

/// Evidence must fall inside the session window (with tolerance), and the
/// latest liveness and face-match evidence must be close in time.
pub fn validate_temporal(
    session: &Session,
    documents: &[Document],
    matches: &[FaceMatch],
    results: &[LivenessResult],
) -> ComponentValidation {
    let mut errors = Vec::new();
    let window_end = session.updated_at + Duration::minutes(EVIDENCE_TOLERANCE_MINS);

    let timestamps = documents
        .iter()
        .map(|d| d.created_at)
        .chain(matches.iter().map(|m| m.created_at))
        .chain(results.iter().map(|r| r.created_at));
    for ts in timestamps {
        if ts < session.created_at || ts > window_end {
            errors.push("evidence recorded outside the session window".to_string());
            break;
        }
    }

    let latest_match = matches.iter().map(|m| m.created_at).max();
    let latest_liveness = results.iter().map(|r| r.created_at).max();
    if let (Some(face_at), Some(live_at)) = (latest_match, latest_liveness) {
        let gap = (face_at - live_at).abs();
        if gap > Duration::minutes(MODALITY_GAP_MINS) {
            errors.push(format!(
                "face match and liveness evidence {} minutes apart",
                gap.num_minutes()
            ));
        }
    }

    let valid = errors.is_empty();
    ComponentValidation {
        component: Component::Temporal,
        valid,
        confidence_score: if valid { 1.0 } else { 0.5 },
        errors,
    }
}

/// Weighted average over the modalities that ran.
fn fuse_score(summary: &ValidationSummary) -> Option<f64> {
    let parts = [
        (&summary.document, WEIGHT_DOCUMENT),
        (&summary.face, WEIGHT_FACE),
        (&summary.liveness, WEIGHT_LIVENESS),
    ];
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (component, weight) in parts {
        if let Some(validation) = component {
            weighted += validation.confidence_score * weight;
            weight_sum += weight;
        }
    }
    (weight_sum > 0.0).then(|| weighted / weight_sum)
}

fn review_band(verification_type: VerificationType) -> f64 {
    match verification_type {
        VerificationType::Enhanced => REVIEW_BAND_ENHANCED,
        _ => REVIEW_BAND,
    }
}

fn failure_reason(summary: &ValidationSummary) -> Option<String> {
    let reasons: Vec<String> = summary
        .failing()
        .map(|c| format!("{}: {}", c.component.label(), c.errors.join(", ")))
        .collect();
    (!reasons.is_empty()).then(|| reasons.join("; "))
}

/// Run all component validations over a snapshot and decide the verdict.
pub fn fuse(
    session: &Session,
    documents: &[Document],
    extracted: &[ExtractedData],
    matches: &[FaceMatch],
    results: &[LivenessResult],
    thresholds: FusionThresholds,
) -> FusionReport {
    let summary = ValidationSummary {
        document: validate_documents(documents, extracted),
        face: validate_face_matches(matches, thresholds.face_match),
        liveness: validate_liveness(results, thresholds.liveness),
        temporal: validate_temporal(session, documents, matches, results),
    };

    let fused_score = fuse_score(&summary);
    let all_valid = summary.all_valid();

    let verdict = match fused_score {
        None => Verdict::Rejected,
        Some(_) if !all_valid => Verdict::Rejected,
        Some(score) => {
            let band = review_band(session.verification_type);
            // Strictly inside the band; a score sitting exactly band-width
            // away decides on the threshold comparison below.
            if (score - thresholds.global).abs() < band {
                Verdict::NeedsReview
            } else if score >= thresholds.global {
                Verdict::Approved
            } else {
                Verdict::Rejected
            }
        }
    };

    let failure_reason = match verdict {
        Verdict::Approved | Verdict::NeedsReview => None,
        Verdict::Rejected => failure_reason(&summary).or_else(|| {
            fused_score.map(|score| {
                format!(
                    "fused confidence {score:.2} below threshold {:.2}",
                    thresholds.global
                )
            })
        }),
    };

    FusionReport {
        summary,
        fused_score,
        verdict,
        failure_reason,
    }
}
