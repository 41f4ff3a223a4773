//! Column encryption keys: plaintext key material and the metadata that
//! describes each encrypted copy of a key.

pub mod cache;
pub mod signature_cache;

pub use cache::SymmetricKeyCache;
pub use signature_cache::SignatureVerificationCache;

use std::fmt;

use crate::error::Error;
use crate::secret::SecretBytes;

/// A decrypted column encryption key.
///
/// The root key is zeroed when the last reference drops; `Debug` output is
/// redacted.
pub struct SymmetricKey {
    root_key: SecretBytes,
}

impl SymmetricKey {
    /// Wrap decrypted key material.
    ///
    /// # Errors
    ///
    /// Returns an empty-argument error if `root_key` has no bytes.
    pub fn new(root_key: Vec<u8>) -> Result<Self, Error> {
        if root_key.is_empty() {
            return Err(Error::EmptyArgument {
                name: "root_key",
                context: "SymmetricKey::new",
            });
        }
        Ok(Self {
            root_key: SecretBytes::new(root_key),
        })
    }

    /// The plaintext key bytes.
    pub fn root_key(&self) -> &[u8] {
        self.root_key.as_bytes()
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Metadata for one encrypted copy of a column encryption key, as delivered
/// in the server's cipher metadata. A CEK encrypted by several column master
/// keys appears as several of these with the same plaintext.
#[derive(Debug, Clone)]
pub struct EncryptionKeyInfo {
    pub encrypted_key: Vec<u8>,
    pub database_id: i32,
    pub cek_id: i32,
    pub cek_version: i32,
    pub cek_md_version: Vec<u8>,
    pub key_store_name: String,
    pub key_path: String,
    pub algorithm_name: String,
}

/// One column encryption key as the server describes it: an ordered list of
/// encrypted values, one per column master key that wraps it.
#[derive(Debug, Clone, Default)]
pub struct CipherInfoEntry {
    pub column_encryption_key_values: Vec<EncryptionKeyInfo>,
}

impl CipherInfoEntry {
    pub fn new(column_encryption_key_values: Vec<EncryptionKeyInfo>) -> Self {
        Self {
            column_encryption_key_values,
        }
    }
}
