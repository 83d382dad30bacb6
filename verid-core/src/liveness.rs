//! Liveness evaluation.
//!
//! The passive path runs five image checks over a single capture. Active
//! challenges (blink, head turn, smile, challenge-response) score every
//! submitted frame with the passive analyzer and require at least two frames;
//! frame-to-frame motion analysis is an extension point behind
//! [`ChallengeType`], not implemented here.

use image::DynamicImage;
use serde::Serialize;

use crate::analysis;
use crate::error::{Result, VeridError};
use crate::model::ChallengeType;

/// Anti-spoofing floor for the passive check.
pub const ANTI_SPOOF_MIN: f64 = 0.6;
/// Image-quality floor.
pub const QUALITY_MIN: f64 = 0.5;
/// Laplacian-variance sharpness floor.
pub const SHARPNESS_MIN: f64 = 500.0;
/// Intensity-stddev contrast floor.
pub const CONTRAST_MIN: f64 = 30.0;
/// Texture-complexity floor.
pub const TEXTURE_MIN: f64 = 0.4;
/// Checks that must pass for a frame to count as live.
pub const MIN_CHECKS_PASSED: u8 = 3;
/// Frames an active challenge needs to be evaluable at all.
pub const MIN_CHALLENGE_FRAMES: usize = 2;

/// One named check with its measured value and floor.
///
/// Write-only on the wire: analyses are serialized into the encrypted
/// result blob and never read back.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessCheck {
    pub name: &'static str,
    pub value: f64,
    pub floor: f64,
    pub passed: bool,
}

impl LivenessCheck {
    fn new(name: &'static str, value: f64, floor: f64) -> Self {
        Self {
            name,
            value,
            floor,
            passed: value > floor,
        }
    }
}

/// Full analysis of one liveness submission.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessAnalysis {
    pub is_live: bool,
    pub liveness_score: f64,
    pub confidence_level: f64,
    pub checks_passed: u8,
    pub checks_total: u8,
    pub checks: Vec<LivenessCheck>,
}

pub struct LivenessEvaluator {
    live_threshold: f64,
}

impl LivenessEvaluator {
    pub fn new(live_threshold: f64) -> Self {
        Self { live_threshold }
    }

    /// Evaluate a challenge over its submitted frames.
    ///
    /// Passive uses the first frame. Active challenges need at least
    /// [`MIN_CHALLENGE_FRAMES`] frames; with fewer, the submission is not
    /// live at zero confidence rather than an error, since a short clip is a
    /// user problem, not a caller bug. With enough frames, every frame is
    /// scored and the worst one decides.
    pub fn evaluate(
        &self,
        challenge: ChallengeType,
        frames: &[DynamicImage],
    ) -> Result<LivenessAnalysis> {
        match challenge {
            ChallengeType::Passive => {
                let frame = frames
                    .first()
                    .ok_or_else(|| VeridError::Validation("no frame submitted".to_string()))?;
                Ok(self.evaluate_frame(frame))
            }
            _ => {
                if frames.len() < MIN_CHALLENGE_FRAMES {
                    return Ok(LivenessAnalysis {
                        is_live: false,
                        liveness_score: 0.0,
                        confidence_level: 0.0,
                        checks_passed: 0,
                        checks_total: 5,
                        checks: Vec::new(),
                    });
                }
                let worst = frames
                    .iter()
                    .map(|frame| self.evaluate_frame(frame))
                    .min_by(|a, b| a.confidence_level.total_cmp(&b.confidence_level));
                // frames.len() >= 2, so the iterator is never empty
                worst.ok_or_else(|| VeridError::Validation("no frame submitted".to_string()))
            }
        }
    }

    /// Run the five passive checks over a single frame.
    pub fn evaluate_frame(&self, frame: &DynamicImage) -> LivenessAnalysis {
        let gray = frame.to_luma8();
        let anti_spoof = analysis::anti_spoofing_score(frame);
        let quality = analysis::quality_score(&gray);

        let checks = vec![
            LivenessCheck::new("anti_spoofing", anti_spoof, ANTI_SPOOF_MIN),
            LivenessCheck::new("quality", quality, QUALITY_MIN),
            LivenessCheck::new("sharpness", analysis::sharpness(&gray), SHARPNESS_MIN),
            LivenessCheck::new("contrast", analysis::contrast(&gray), CONTRAST_MIN),
            LivenessCheck::new(
                "texture",
                analysis::texture_complexity(&gray),
                TEXTURE_MIN,
            ),
        ];

        let checks_passed = checks.iter().filter(|c| c.passed).count() as u8;
        let confidence = (anti_spoof + quality) / 2.0;

        LivenessAnalysis {
            is_live: confidence >= self.live_threshold && checks_passed >= MIN_CHECKS_PASSED,
            liveness_score: confidence,
            confidence_level: confidence,
            checks_passed,
            checks_total: checks.len() as u8,
            checks,
        }
    }
}
