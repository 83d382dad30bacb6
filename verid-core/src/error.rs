use thiserror::Error;

use crate::model::SessionStatus;

#[derive(Error, Debug)]
pub enum VeridError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("No face detected in {context} image")]
    NoFaceDetected { context: &'static str },

    #[error("Face area ratio {ratio:.3} outside acceptable range [{min:.2}, {max:.2}]")]
    FaceOutOfRange { ratio: f64, min: f64, max: f64 },

    #[error("Image resolution {width}x{height} below required minimum {min}x{min}")]
    LowResolution { width: u32, height: u32, min: u32 },

    #[error("Feature vectors have mismatched dimensions: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Illegal session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Unsupported challenge type: {0}")]
    UnsupportedChallenge(String),
}

pub type Result<T> = std::result::Result<T, VeridError>;
