//! [`EnclaveKeyPackager`]: builds the encrypted key package a query sends to
//! the enclave.
//!
//! For each enclave-enabled execution the packager:
//!
//! 1. fetches the trust session (a missing session is the retryable case:
//!    the driver renegotiates attestation and runs the query again),
//! 2. decrypts the column encryption keys the query needs through
//!    [`SymmetricKeyCache`],
//! 3. serializes `[package id][counter][query hash][key sections]` into one
//!    pre-sized buffer,
//! 4. encrypts the whole package with the session secret under randomized
//!    AEAD, and prefixes the session handle.
//!
//! One package is generated per execution; the counter baked into it is
//! fresh on every call, which is what defeats replay of a captured package.

pub mod key_info;

pub use key_info::ColumnEncryptionKeyInfo;

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use enclave_wire::package::{COUNTER_LEN, PACKAGE_ID_LEN, QUERY_HASH_LEN, SESSION_HANDLE_LEN};

use crate::crypto::{AeadCipherFactory, EncryptionMode, GcmSivCipherFactory, ALGORITHM_NAME};
use crate::error::Error;
use crate::keys::{CipherInfoEntry, SymmetricKeyCache};
use crate::provider::KeyStoreContext;
use crate::session::{EnclaveSession, EnclaveSessionCache, EnclaveSessionParameters};

/// An encrypted key package paired with the session it was built for.
///
/// `bytes` is what goes on the wire: the 8-byte LE session handle followed
/// by the AEAD ciphertext of the package.
#[derive(Debug)]
pub struct EnclaveKeyPackage {
    bytes: Vec<u8>,
    session: Arc<EnclaveSession>,
}

impl EnclaveKeyPackage {
    /// The transmit-ready bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The session this package was encrypted under; the caller passes it to
    /// `invalidate_session` if the server rejects the package.
    pub fn session(&self) -> &Arc<EnclaveSession> {
        &self.session
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Builds and encrypts enclave key packages.
pub struct EnclaveKeyPackager {
    session_cache: Arc<EnclaveSessionCache>,
    key_cache: Arc<SymmetricKeyCache>,
    cipher_factory: Arc<dyn AeadCipherFactory>,
}

impl EnclaveKeyPackager {
    /// Create a packager over the shared caches with the default
    /// AES-256-GCM-SIV cipher factory.
    pub fn new(
        session_cache: Arc<EnclaveSessionCache>,
        key_cache: Arc<SymmetricKeyCache>,
    ) -> Self {
        Self::with_cipher_factory(session_cache, key_cache, Arc::new(GcmSivCipherFactory))
    }

    /// Create a packager with a custom cipher factory.
    pub fn with_cipher_factory(
        session_cache: Arc<EnclaveSessionCache>,
        key_cache: Arc<SymmetricKeyCache>,
        cipher_factory: Arc<dyn AeadCipherFactory>,
    ) -> Self {
        Self {
            session_cache,
            key_cache,
            cipher_factory,
        }
    }

    /// Produce the full transmit-ready package for one query execution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Retryable`] when no session is cached for `params`
    /// (the driver should renegotiate attestation and retry the whole
    /// execution); all other failures are fatal for this execution.
    pub fn generate_package(
        &self,
        params: &EnclaveSessionParameters,
        keys_to_send: &[CipherInfoEntry],
        query_text: &str,
        ctx: &KeyStoreContext,
    ) -> Result<EnclaveKeyPackage, Error> {
        let (session, counter) = self.session_cache.get_session(params);
        let Some(session) = session else {
            return Err(Error::retryable(format!(
                "no enclave session is cached for attestation URL '{}'; \
                 it may have been invalidated by a concurrent execution",
                params.attestation_url
            )));
        };

        let keys = self.decrypt_keys_for_enclave(keys_to_send, ctx)?;
        let query_hash = Self::compute_query_hash(query_text)?;
        let package = self.build_package(counter, &query_hash, &keys);
        let encrypted = self.encrypt_package(&package, session.session_key())?;

        let mut bytes = Vec::with_capacity(SESSION_HANDLE_LEN + encrypted.len());
        bytes.extend_from_slice(&session.session_id().to_le_bytes());
        bytes.extend_from_slice(&encrypted);

        debug!(
            session_id = session.session_id(),
            counter,
            keys = keys.len(),
            "enclave key package generated"
        );
        Ok(EnclaveKeyPackage { bytes, session })
    }

    /// Decrypt every column encryption key destined for the enclave.
    ///
    /// Each entry may carry several encrypted copies of the same key (one
    /// per wrapping column master key); they are attempted in order and the
    /// first that decrypts supplies the plaintext. The emitted identifiers
    /// always come from the entry's first value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for an entry with no encrypted values
    /// (malformed server metadata), or the last decryption error if every
    /// value fails.
    pub fn decrypt_keys_for_enclave(
        &self,
        keys_to_send: &[CipherInfoEntry],
        ctx: &KeyStoreContext,
    ) -> Result<Vec<ColumnEncryptionKeyInfo>, Error> {
        let mut decrypted = Vec::with_capacity(keys_to_send.len());
        for entry in keys_to_send {
            let Some(first) = entry.column_encryption_key_values.first() else {
                return Err(Error::Internal(
                    "cipher metadata entry carries no encrypted column encryption key values"
                        .into(),
                ));
            };

            let mut key = None;
            let mut last_error = None;
            for value in &entry.column_encryption_key_values {
                match self.key_cache.get_key(value, ctx) {
                    Ok(k) => {
                        key = Some(k);
                        break;
                    }
                    Err(e) => last_error = Some(e),
                }
            }
            let Some(key) = key else {
                return Err(last_error.unwrap_or_else(|| {
                    Error::Internal("column encryption key decryption failed without error".into())
                }));
            };

            decrypted.push(ColumnEncryptionKeyInfo::new(
                key,
                first.database_id,
                first.cek_md_version.clone(),
                first.cek_id,
            ));
        }
        Ok(decrypted)
    }

    /// Serialize the plaintext package:
    /// `[16-byte random id][8-byte LE counter][query hash][key sections]`.
    ///
    /// The buffer is sized up front from the known section lengths and
    /// written exactly once; the final length is asserted against the
    /// computed total.
    pub fn build_package(
        &self,
        session_counter: u64,
        query_hash: &[u8],
        keys: &[ColumnEncryptionKeyInfo],
    ) -> Vec<u8> {
        let total = PACKAGE_ID_LEN
            + COUNTER_LEN
            + query_hash.len()
            + keys.iter().map(ColumnEncryptionKeyInfo::serialized_len).sum::<usize>();

        let mut buf = BytesMut::with_capacity(total);
        buf.put_slice(Uuid::new_v4().as_bytes());
        buf.put_u64_le(session_counter);
        buf.put_slice(query_hash);
        for key in keys {
            key.serialize_into(&mut buf);
        }

        assert_eq!(
            buf.len(),
            total,
            "key package length diverged from its computed size"
        );
        buf.to_vec()
    }

    /// Encrypt a serialized package with the session's shared secret under
    /// randomized AEAD. Two calls over identical input produce different
    /// ciphertext.
    ///
    /// # Errors
    ///
    /// Returns an empty-argument error for an empty secret (checked before
    /// any cipher is constructed) and [`Error::PackageEncryptionFailed`]
    /// wrapping any cipher failure.
    pub fn encrypt_package(
        &self,
        package: &[u8],
        session_secret: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if session_secret.is_empty() {
            return Err(Error::EmptyArgument {
                name: "session_secret",
                context: "EnclaveKeyPackager::encrypt_package",
            });
        }
        let cipher = self
            .cipher_factory
            .create(session_secret, EncryptionMode::Randomized, ALGORITHM_NAME)
            .map_err(|source| Error::PackageEncryptionFailed { source })?;
        cipher
            .encrypt(package)
            .map_err(|source| Error::PackageEncryptionFailed { source })
    }

    /// SHA-256 over the UTF-16LE encoding of the query text.
    ///
    /// # Errors
    ///
    /// Returns an empty-argument error for empty or whitespace-only text.
    pub fn compute_query_hash(query_text: &str) -> Result<[u8; QUERY_HASH_LEN], Error> {
        if query_text.trim().is_empty() {
            return Err(Error::EmptyArgument {
                name: "query_text",
                context: "EnclaveKeyPackager::compute_query_hash",
            });
        }
        let mut encoded = Vec::with_capacity(query_text.len() * 2);
        for unit in query_text.encode_utf16() {
            encoded.extend_from_slice(&unit.to_le_bytes());
        }
        Ok(Sha256::digest(&encoded).into())
    }
}
