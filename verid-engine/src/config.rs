//! Engine configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use verid_core::FusionThresholds;

/// Engine configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum OCR extraction confidence for a document to validate (default: 0.7)
    pub ocr_threshold: f64,
    /// Face similarity required for a match decision (default: 0.8)
    pub face_match_threshold: f64,
    /// Liveness confidence required for a live decision (default: 0.7)
    pub liveness_threshold: f64,
    /// Fused confidence required for approval (default: 0.85)
    pub global_threshold: f64,
    /// Hours until a fresh session expires (default: 24)
    pub session_expiry_hours: i64,
    /// AES-256 key for at-rest encryption; `None` runs the passthrough cipher
    pub encryption_key: Option<[u8; 32]>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ocr_threshold: 0.7,
            face_match_threshold: 0.8,
            liveness_threshold: 0.7,
            global_threshold: 0.85,
            session_expiry_hours: 24,
            encryption_key: None, // None = passthrough (dev mode)
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ocr_threshold = std::env::var("VERID_OCR_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.ocr_threshold);

        let face_match_threshold = std::env::var("VERID_FACE_MATCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.face_match_threshold);

        let liveness_threshold = std::env::var("VERID_LIVENESS_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.liveness_threshold);

        let global_threshold = std::env::var("VERID_GLOBAL_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.global_threshold);

        let session_expiry_hours = std::env::var("VERID_SESSION_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.session_expiry_hours);

        let encryption_key = std::env::var("VERID_ENCRYPTION_KEY")
            .ok()
            .and_then(|hex_key| parse_encryption_key(&hex_key));

        Self {
            ocr_threshold,
            face_match_threshold,
            liveness_threshold,
            global_threshold,
            session_expiry_hours,
            encryption_key,
        }
    }

    /// The thresholds handed to fusion runs.
    pub fn fusion_thresholds(&self) -> FusionThresholds {
        FusionThresholds {
            face_match: self.face_match_threshold,
            liveness: self.liveness_threshold,
            global: self.global_threshold,
        }
    }
}

/// Parse a hex-encoded 32-byte key. Anything else is rejected, loudly: a
/// truncated key silently falling back to passthrough would be worse than a
/// startup failure.
fn parse_encryption_key(hex_key: &str) -> Option<[u8; 32]> {
    match hex::decode(hex_key.trim()) {
        Ok(bytes) if bytes.len() == 32 => {
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            Some(key)
        }
        Ok(bytes) => {
            tracing::error!(
                got = bytes.len(),
                "VERID_ENCRYPTION_KEY must decode to 32 bytes; ignoring"
            );
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "VERID_ENCRYPTION_KEY is not valid hex; ignoring");
            None
        }
    }
}
