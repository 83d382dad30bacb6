//! At-rest encryption for stored text, metadata and storage references.
//!
//! AES-256-GCM with a random 96-bit nonce prefixed to the ciphertext, the
//! whole blob base64-encoded: `base64(nonce || ciphertext || auth_tag)`.
//! The passthrough cipher stands in where no key is configured (dev, tests).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{EngineError, Result};

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// At-rest protection for a stored field. Failure is fatal for the operation
/// touching that field.
pub trait BlobCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, encoded: &str) -> Result<String>;
}

/// AES-256-GCM cipher for production deployments.
pub struct AesGcmCipher {
    key: [u8; 32],
}

impl AesGcmCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| EngineError::encryption(e.to_string()))
    }
}

impl BlobCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        use rand::rngs::OsRng;
        use rand::RngCore;

        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| EngineError::encryption(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(&result))
    }

    fn decrypt(&self, encoded: &str) -> Result<String> {
        let encrypted = BASE64
            .decode(encoded)
            .map_err(|e| EngineError::encryption(format!("base64 decode failed: {e}")))?;

        if encrypted.len() < NONCE_SIZE + 1 {
            return Err(EngineError::encryption("encrypted blob too short"));
        }

        let cipher = self.cipher()?;
        let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(nonce, &encrypted[NONCE_SIZE..])
            .map_err(|e| EngineError::encryption(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| EngineError::encryption(e.to_string()))
    }
}

/// Identity cipher for development and tests.
/// WARNING: Do not use in production - stores plaintext!
pub struct PassthroughCipher;

impl BlobCipher for PassthroughCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, encoded: &str) -> Result<String> {
        Ok(encoded.to_string())
    }
}
