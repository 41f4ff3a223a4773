//! AEAD cipher seam for key-package encryption.
//!
//! The packager never touches a cipher directly; it asks an
//! [`AeadCipherFactory`] for an [`AeadCipher`] over the session's shared
//! secret. The default factory is backed by AES-256-GCM-SIV
//! ([`cipher::GcmSivCipherFactory`]); tests and alternative deployments can
//! substitute their own.

pub mod cipher;

pub use cipher::{GcmSivCipherFactory, ALGORITHM_NAME, KEY_LEN, NONCE_LEN};

use thiserror::Error;

/// Whether two encryptions of the same plaintext may be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Fresh random nonce per call; identical plaintexts produce different
    /// ciphertexts. Required for key packages.
    Randomized,
    /// Plaintext-derived nonce; identical plaintexts produce identical
    /// ciphertexts.
    Deterministic,
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key has the wrong length for the selected algorithm.
    #[error("invalid cipher key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// No cipher implementation is registered under the requested name.
    #[error("unknown cipher algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The AEAD operation itself failed (encryption, or authentication on
    /// decryption).
    #[error("aead operation failed")]
    AeadFailure,

    /// The ciphertext is too short to carry a nonce.
    #[error("ciphertext is too short to contain a nonce")]
    InvalidCiphertext,
}

/// An authenticated cipher bound to one key and mode.
pub trait AeadCipher: Send + Sync {
    /// Encrypt `plaintext`, returning nonce-prefixed ciphertext.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Invert [`AeadCipher::encrypt`].
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Constructs [`AeadCipher`]s for a key, mode, and algorithm name.
pub trait AeadCipherFactory: Send + Sync {
    /// Build a cipher over `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::UnknownAlgorithm`] for an unsupported
    /// `algorithm_name` and [`CipherError::InvalidKeyLength`] for a key of
    /// the wrong size.
    fn create(
        &self,
        key: &[u8],
        mode: EncryptionMode,
        algorithm_name: &str,
    ) -> Result<Box<dyn AeadCipher>, CipherError>;
}
