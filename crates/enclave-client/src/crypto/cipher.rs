//! AES-256-GCM-SIV implementation of the AEAD cipher seam.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-
//! resistant, so even the deterministic mode (plaintext-derived nonce) never
//! degrades into the catastrophic nonce-reuse failure of plain GCM.
//!
//! # Ciphertext format
//!
//! ```text
//! [12-byte nonce][ciphertext + tag]
//! ```

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use sha2::{Digest, Sha256};

use super::{AeadCipher, AeadCipherFactory, CipherError, EncryptionMode};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Name under which this implementation registers itself.
pub const ALGORITHM_NAME: &str = "AEAD_AES_256_GCM_SIV";

/// Factory producing AES-256-GCM-SIV ciphers.
pub struct GcmSivCipherFactory;

impl AeadCipherFactory for GcmSivCipherFactory {
    fn create(
        &self,
        key: &[u8],
        mode: EncryptionMode,
        algorithm_name: &str,
    ) -> Result<Box<dyn AeadCipher>, CipherError> {
        if algorithm_name != ALGORITHM_NAME {
            return Err(CipherError::UnknownAlgorithm(algorithm_name.to_owned()));
        }
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        let cipher = Aes256GcmSiv::new_from_slice(key).map_err(|_| {
            CipherError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            }
        })?;
        Ok(Box::new(GcmSivCipher { cipher, mode }))
    }
}

struct GcmSivCipher {
    cipher: Aes256GcmSiv,
    mode: EncryptionMode,
}

impl GcmSivCipher {
    fn nonce_for(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        match self.mode {
            EncryptionMode::Randomized => {
                use aes_gcm_siv::aead::rand_core::RngCore;
                OsRng.fill_bytes(&mut nonce);
            }
            EncryptionMode::Deterministic => {
                // Derive the nonce from the plaintext so identical inputs
                // produce identical ciphertexts. Safe under SIV.
                let digest = Sha256::digest(plaintext);
                nonce.copy_from_slice(&digest[..NONCE_LEN]);
            }
        }
        nonce
    }
}

impl AeadCipher for GcmSivCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce_bytes = self.nonce_for(plaintext);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::AeadFailure)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CipherError::InvalidCiphertext);
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, body)
            .map_err(|_| CipherError::AeadFailure)
    }
}
