//! Verid Engine - Identity-verification session orchestration
//!
//! Drives the workflow around [`verid_core`]: session creation, evidence
//! recording with per-modality async processing, on-demand fusion, and the
//! terminal completion/cancellation/expiry paths. Storage, OCR, face
//! detection and at-rest encryption are all collaborator traits; the crate
//! ships in-memory and mock implementations suitable for tests and
//! ephemeral deployments.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use verid_core::{MockFaceDetector, MockTextExtractor, VerificationType};
//! use verid_engine::{EngineConfig, PassthroughCipher, Stores, VerificationEngine};
//!
//! # async fn example() -> verid_engine::Result<()> {
//! let engine = VerificationEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(PassthroughCipher),
//!     Arc::new(MockTextExtractor::new("Passport No: X1234567", 0.92)),
//!     Arc::new(MockFaceDetector::centered(400, 400)),
//!     Stores::in_memory(),
//! );
//!
//! let session = engine.create_session("user-42", VerificationType::DocumentOnly).await?;
//! assert_eq!(session.progress, 10);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod service;
pub mod store;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use crypto::{AesGcmCipher, BlobCipher, PassthroughCipher};
pub use error::{EngineError, Result, StorageError};
pub use service::{Stores, VerificationEngine};
pub use store::{DocumentStore, FaceMatchStore, LivenessStore, SessionStore};
