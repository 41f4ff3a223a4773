//! Client-side key channel for computations over encrypted columns inside a
//! server-hosted secure enclave.
//!
//! The surrounding driver uses this crate to:
//!
//! 1. Look up (or, after an external attestation exchange, install) a trust
//!    session with the enclave via [`session::EnclaveSessionCache`].
//! 2. Decrypt the column encryption keys a query needs via
//!    [`keys::SymmetricKeyCache`], falling through to registered
//!    [`provider::KeyStoreProvider`]s on a miss.
//! 3. Build and encrypt the key package transmitted to the enclave via
//!    [`packager::EnclaveKeyPackager`].
//!
//! Plaintext column-encryption keys and session secrets never leave this
//! crate unencrypted: they live in zero-on-drop buffers, are redacted from
//! `Debug` output, and are only written out inside the AEAD-encrypted
//! package. The attestation protocol itself, the wire transport, and the
//! key-store backends are external collaborators reached through the seams
//! in [`attestation`], [`crypto`], and [`provider`].

pub mod attestation;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod packager;
pub mod provider;
pub mod security;
pub mod session;
pub mod telemetry;

mod secret;

pub use attestation::{AttestationParameters, AttestationProtocol};
pub use config::Settings;
pub use error::Error;
pub use keys::{
    CipherInfoEntry, EncryptionKeyInfo, SignatureVerificationCache, SymmetricKey,
    SymmetricKeyCache,
};
pub use packager::{EnclaveKeyPackage, EnclaveKeyPackager};
pub use provider::{KeyStoreContext, KeyStoreProvider, ProviderRegistry, TrustedKeyPaths};
pub use secret::SecretBytes;
pub use session::{EnclaveSession, EnclaveSessionCache, EnclaveSessionParameters};
