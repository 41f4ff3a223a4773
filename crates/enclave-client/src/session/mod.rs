//! Enclave trust sessions and their identity parameters.
//!
//! A session is established externally: the driver runs the attestation
//! exchange, derives a shared secret, and installs the result here via
//! [`cache::EnclaveSessionCache::create_session`]. From then on the session
//! is immutable and handed out by shared reference.

pub mod cache;

pub use cache::EnclaveSessionCache;

use std::fmt;

use crate::secret::SecretBytes;

/// Identity of a trust session: which server, database, and attestation
/// service it belongs to. All three fields are compared case-insensitively
/// when used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveSessionParameters {
    pub server_name: String,
    pub database_name: String,
    pub attestation_url: String,
}

impl EnclaveSessionParameters {
    pub fn new(
        server_name: impl Into<String>,
        database_name: impl Into<String>,
        attestation_url: impl Into<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            database_name: database_name.into(),
            attestation_url: attestation_url.into(),
        }
    }

    /// Cache key: the lowercased concatenation of server, database, and
    /// attestation URL. Case-folding makes separators unnecessary; session
    /// reuse is an intra-process concern only.
    pub(crate) fn cache_key(&self) -> String {
        let mut key = String::with_capacity(
            self.server_name.len() + self.database_name.len() + self.attestation_url.len(),
        );
        key.push_str(&self.server_name);
        key.push_str(&self.database_name);
        key.push_str(&self.attestation_url);
        key.to_lowercase()
    }
}

/// An established trust session with an enclave.
///
/// Immutable once created. The shared secret is zeroed when the last
/// reference drops and never appears in logs or `Debug` output.
pub struct EnclaveSession {
    shared_secret: SecretBytes,
    session_id: u64,
}

impl EnclaveSession {
    pub(crate) fn new(shared_secret: Vec<u8>, session_id: u64) -> Self {
        Self {
            shared_secret: SecretBytes::new(shared_secret),
            session_id,
        }
    }

    /// Enclave-assigned session identifier; also the session handle prefixed
    /// to every transmitted key package.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// The attestation-derived shared secret used to encrypt key packages.
    pub fn session_key(&self) -> &[u8] {
        self.shared_secret.as_bytes()
    }
}

impl fmt::Debug for EnclaveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnclaveSession")
            .field("session_id", &self.session_id)
            .field("shared_secret", &self.shared_secret)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_case_insensitive() {
        let a = EnclaveSessionParameters::new("Server", "DB", "https://Attest/x");
        let b = EnclaveSessionParameters::new("sErVeR", "db", "HTTPS://attest/X");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_differs_per_field() {
        let a = EnclaveSessionParameters::new("s", "d", "u");
        let b = EnclaveSessionParameters::new("s", "d", "u2");
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn session_debug_redacts_secret() {
        let session = EnclaveSession::new(vec![7; 32], 99);
        let rendered = format!("{session:?}");
        assert!(rendered.contains("99"));
        assert!(rendered.contains("REDACTED"));
    }
}
