//! Vision collaborators: OCR and face detection.
//!
//! Production deployments plug in real model backends behind these traits;
//! the deterministic mocks are the reference implementations used throughout
//! the test suites. Implementations must be thread-safe (`Send + Sync`).

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VeridError};

/// Minimum acceptable width and height for any image a face is read from.
pub const MIN_FACE_RESOLUTION: u32 = 200;
/// Acceptable span of face-area-to-image-area ratios.
pub const FACE_AREA_RATIO: std::ops::RangeInclusive<f64> = 0.10..=0.80;

/// OCR output: recognized text plus the backend's own confidence in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub confidence: f64,
}

/// OCR collaborator.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Run text recognition over an encoded document image.
    async fn extract_text(&self, image: &[u8]) -> Result<ExtractedText>;
}

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One detected face. The embedding is backend-optional: detectors without a
/// recognition model return `None` and the comparator falls back to gradient
/// statistics over the cropped region.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: FaceBox,
    pub embedding: Option<Vec<f32>>,
}

/// Face-detection collaborator.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect all faces in a decoded image.
    async fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>>;
}

/// Pick the primary face out of a detection result and gate it on the
/// resolution and area-ratio windows. `context` names the image role
/// ("reference" or "live") for error reporting.
pub fn select_primary_face(
    image: &DynamicImage,
    faces: Vec<DetectedFace>,
    context: &'static str,
) -> Result<DetectedFace> {
    let (width, height) = (image.width(), image.height());
    if width < MIN_FACE_RESOLUTION || height < MIN_FACE_RESOLUTION {
        return Err(VeridError::LowResolution {
            width,
            height,
            min: MIN_FACE_RESOLUTION,
        });
    }

    let primary = faces
        .into_iter()
        .max_by_key(|f| f.bbox.area())
        .ok_or(VeridError::NoFaceDetected { context })?;

    let ratio = primary.bbox.area() as f64 / (width as u64 * height as u64) as f64;
    if !FACE_AREA_RATIO.contains(&ratio) {
        return Err(VeridError::FaceOutOfRange {
            ratio,
            min: *FACE_AREA_RATIO.start(),
            max: *FACE_AREA_RATIO.end(),
        });
    }
    Ok(primary)
}

/// Deterministic OCR mock: always returns the configured text and confidence.
pub struct MockTextExtractor {
    text: String,
    confidence: f64,
}

impl MockTextExtractor {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

#[async_trait]
impl TextExtractor for MockTextExtractor {
    async fn extract_text(&self, _image: &[u8]) -> Result<ExtractedText> {
        Ok(ExtractedText {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

/// Deterministic detector mock: returns the configured boxes for every image.
pub struct MockFaceDetector {
    faces: Vec<DetectedFace>,
}

impl MockFaceDetector {
    pub fn new(faces: Vec<DetectedFace>) -> Self {
        Self { faces }
    }

    /// A single centered face covering ~25% of the image, no embedding.
    pub fn centered(image_width: u32, image_height: u32) -> Self {
        let width = image_width / 2;
        let height = image_height / 2;
        Self::new(vec![DetectedFace {
            bbox: FaceBox {
                x: image_width / 4,
                y: image_height / 4,
                width,
                height,
            },
            embedding: None,
        }])
    }

    /// A detector that never finds a face.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl FaceDetector for MockFaceDetector {
    async fn detect_faces(&self, _image: &DynamicImage) -> Result<Vec<DetectedFace>> {
        Ok(self.faces.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([128])))
    }

    fn face(x: u32, y: u32, width: u32, height: u32) -> DetectedFace {
        DetectedFace {
            bbox: FaceBox {
                x,
                y,
                width,
                height,
            },
            embedding: None,
        }
    }

    #[test]
    fn test_largest_face_wins() {
        let image = test_image(400, 400);
        let selected = select_primary_face(
            &image,
            vec![face(0, 0, 150, 150), face(100, 100, 300, 300)],
            "reference",
        )
        .unwrap();
        assert_eq!(selected.bbox.width, 300);
    }

    #[test]
    fn test_no_face_detected() {
        let image = test_image(400, 400);
        let err = select_primary_face(&image, vec![], "live").unwrap_err();
        assert!(matches!(
            err,
            VeridError::NoFaceDetected { context: "live" }
        ));
    }

    #[test]
    fn test_low_resolution_rejected_before_detection() {
        let image = test_image(199, 400);
        let err = select_primary_face(&image, vec![face(0, 0, 100, 100)], "live").unwrap_err();
        assert!(matches!(err, VeridError::LowResolution { min: 200, .. }));
    }

    #[test]
    fn test_face_too_small_or_too_large() {
        let image = test_image(400, 400);

        // 100x100 over 400x400 is a 6.25% ratio, below the 10% floor.
        let err = select_primary_face(&image, vec![face(0, 0, 100, 100)], "live").unwrap_err();
        assert!(matches!(err, VeridError::FaceOutOfRange { .. }));

        // 380x380 is ~90%, above the 80% ceiling.
        let err = select_primary_face(&image, vec![face(0, 0, 380, 380)], "live").unwrap_err();
        assert!(matches!(err, VeridError::FaceOutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_mock_detector_centered() {
        let image = test_image(400, 400);
        let detector = MockFaceDetector::centered(400, 400);
        let faces = detector.detect_faces(&image).await.unwrap();
        assert_eq!(faces.len(), 1);
        assert!(select_primary_face(&image, faces, "reference").is_ok());
    }

    #[tokio::test]
    async fn test_mock_text_extractor_is_deterministic() {
        let ocr = MockTextExtractor::new("P<UTOPIA", 0.92);
        let a = ocr.extract_text(&[1, 2, 3]).await.unwrap();
        let b = ocr.extract_text(&[9, 9, 9]).await.unwrap();
        assert_eq!(a.text, b.text);
        assert_eq!(a.confidence, 0.92);
    }
}
