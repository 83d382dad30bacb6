//! Engine error handling
//!
//! Provides a unified error type for all engine operations with structured
//! error variants. Business-rule failures (low confidence, spoof suspicion,
//! inconsistent documents) are recorded results, not errors; only input,
//! state and system faults surface here.

use thiserror::Error;

/// Persistence-layer failure, kept separate so backends can map their own
/// error types into one place.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Engine error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error from the scoring library
    #[error("Core error: {0}")]
    Core(#[from] verid_core::VeridError),

    /// Requested session/document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not valid for the session's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Blob cipher failure - fatal for the operation touching the field
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Persistence failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// OCR or vision collaborator failure
    #[error("Collaborator failure: {0}")]
    Collaborator(String),
}

impl EngineError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
