//! Face comparison.
//!
//! Blends cosine similarity and Euclidean distance over feature vectors into
//! a single match score, with an agreement-based confidence. Vectors come
//! from the detection collaborator when its backend supplies embeddings;
//! otherwise a gradient-statistics fallback is computed over the cropped
//! face regions.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::analysis;
use crate::error::{Result, VeridError};
use crate::model::MatchAlgorithm;
use crate::vision::DetectedFace;

/// Grid size for the gradient-statistics fallback features.
const FALLBACK_GRID: u32 = 4;

/// A face feature vector. Expected unit-normalized, so Euclidean distance
/// lives in [0, 2].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub Vec<f32>);

impl FeatureVector {
    pub fn cosine_similarity(&self, other: &FeatureVector) -> Result<f64> {
        self.check_dims(other)?;
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for (a, b) in self.0.iter().zip(&other.0) {
            dot += *a as f64 * *b as f64;
            norm_a += (*a as f64).powi(2);
            norm_b += (*b as f64).powi(2);
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }
        Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
    }

    pub fn euclidean_distance(&self, other: &FeatureVector) -> Result<f64> {
        self.check_dims(other)?;
        let sum: f64 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| ((*a - *b) as f64).powi(2))
            .sum();
        Ok(sum.sqrt())
    }

    /// Scale to unit length. A zero vector is left untouched.
    pub fn normalize(mut self) -> Self {
        let norm = self.0.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut self.0 {
                *v = (*v as f64 / norm) as f32;
            }
        }
        self
    }

    fn check_dims(&self, other: &FeatureVector) -> Result<()> {
        if self.0.len() != other.0.len() {
            return Err(VeridError::DimensionMismatch {
                left: self.0.len(),
                right: other.0.len(),
            });
        }
        Ok(())
    }
}

/// Blended similarity: cosine at 0.7, inverted half-distance at 0.3.
pub fn blended_similarity(cosine: f64, euclidean: f64) -> f64 {
    (cosine * 0.7 + (1.0 - euclidean / 2.0) * 0.3).clamp(0.0, 1.0)
}

/// Confidence in a similarity score: how much the two metrics agree (0.3)
/// plus how decisive they are on average (0.7).
pub fn similarity_confidence(cosine: f64, euclidean: f64) -> f64 {
    let agreement = 1.0 - ((1.0 - cosine) - euclidean).abs();
    let strength = (cosine + (1.0 - euclidean)) / 2.0;
    (agreement * 0.3 + strength * 0.7).clamp(0.0, 1.0)
}

/// Outcome of comparing a live capture against a reference face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceComparison {
    pub match_score: f64,
    pub is_match: bool,
    pub confidence_level: f64,
    pub quality_score: f64,
    pub anti_spoofing_score: f64,
    pub algorithm: MatchAlgorithm,
}

pub struct FaceComparator {
    match_threshold: f64,
}

impl FaceComparator {
    pub fn new(match_threshold: f64) -> Self {
        Self { match_threshold }
    }

    /// Compare two selected faces.
    ///
    /// Quality is averaged over both full images; anti-spoofing is judged on
    /// the live capture only, since the reference is a document photo.
    pub fn compare(
        &self,
        reference: &DynamicImage,
        live: &DynamicImage,
        reference_face: &DetectedFace,
        live_face: &DetectedFace,
    ) -> Result<FaceComparison> {
        let (reference_vec, live_vec, algorithm) =
            match (&reference_face.embedding, &live_face.embedding) {
                (Some(a), Some(b)) => (
                    FeatureVector(a.clone()),
                    FeatureVector(b.clone()),
                    MatchAlgorithm::Embedding,
                ),
                _ => (
                    gradient_features(reference, reference_face),
                    gradient_features(live, live_face),
                    MatchAlgorithm::GradientStats,
                ),
            };

        let cosine = reference_vec.cosine_similarity(&live_vec)?;
        let euclidean = reference_vec.euclidean_distance(&live_vec)?;
        let match_score = blended_similarity(cosine, euclidean);

        let quality_score = (analysis::quality_score(&reference.to_luma8())
            + analysis::quality_score(&live.to_luma8()))
            / 2.0;

        Ok(FaceComparison {
            match_score,
            is_match: match_score >= self.match_threshold,
            confidence_level: similarity_confidence(cosine, euclidean),
            quality_score,
            anti_spoofing_score: analysis::anti_spoofing_score(live),
            algorithm,
        })
    }
}

/// Fallback features: per-cell mean intensity and mean gradient magnitude
/// over a fixed grid of the cropped face, unit-normalized. Deterministic and
/// crude, but enough for the same face photographed twice to score high.
pub fn gradient_features(image: &DynamicImage, face: &DetectedFace) -> FeatureVector {
    let crop = image
        .crop_imm(face.bbox.x, face.bbox.y, face.bbox.width, face.bbox.height)
        .to_luma8();
    let (w, h) = crop.dimensions();
    let cell_w = (w / FALLBACK_GRID).max(1);
    let cell_h = (h / FALLBACK_GRID).max(1);

    let mut features = Vec::with_capacity((FALLBACK_GRID * FALLBACK_GRID * 2) as usize);
    for gy in 0..FALLBACK_GRID {
        for gx in 0..FALLBACK_GRID {
            let x0 = gx * cell_w;
            let y0 = gy * cell_h;
            let x1 = (x0 + cell_w).min(w);
            let y1 = (y0 + cell_h).min(h);

            let mut sum = 0.0f64;
            let mut grad = 0.0f64;
            let mut count = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    let v = crop.get_pixel(x, y).0[0] as f64;
                    sum += v;
                    if x + 1 < w && y + 1 < h {
                        let dx = crop.get_pixel(x + 1, y).0[0] as f64 - v;
                        let dy = crop.get_pixel(x, y + 1).0[0] as f64 - v;
                        grad += (dx * dx + dy * dy).sqrt();
                    }
                    count += 1;
                }
            }
            let n = count.max(1) as f64;
            features.push((sum / n / 255.0) as f32);
            features.push((grad / n / 255.0) as f32);
        }
    }
    FeatureVector(features).normalize()
}
