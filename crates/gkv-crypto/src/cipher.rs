//! The pluggable cipher interface.
//!
//! gitkv never picks an encryption algorithm itself. Callers hand the
//! repository any [`Cipher`]; it is applied to value payloads before hashing
//! and after fetching.
//!
//! Keys are content-addressed *after* encryption, so a cipher used for keys
//! must be deterministic (same plaintext, same ciphertext). Otherwise the same
//! key maps to a different UUID on every call.

/// Symmetric encryption consumed as two byte transforms.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Errors reported by a [`Cipher`] implementation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}
