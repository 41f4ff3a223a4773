//! Error taxonomy for the enclave key channel.
//!
//! Categories, in rough order of severity:
//!
//! - argument validation ([`Error::EmptyArgument`]): raised before any
//!   expensive work;
//! - security / trust gates ([`Error::UntrustedKeyPath`],
//!   [`Error::UnrecognizedProvider`], [`Error::MasterKeySignatureNotFound`],
//!   [`Error::InvalidMasterKeySignature`]): fail closed, never bypassed;
//! - cryptographic failures ([`Error::KeyDecryptionFailed`],
//!   [`Error::PackageEncryptionFailed`],
//!   [`Error::SignatureVerificationFailed`], [`Error::Cipher`]): wrapped
//!   with diagnostic context, never leaking plaintext key material;
//! - internal consistency ([`Error::Internal`]): a defect, not a transient
//!   condition;
//! - [`Error::Retryable`]: the one category a caller may react to by
//!   re-running the whole enclave-assisted execution from scratch.

use thiserror::Error;

use crate::crypto::CipherError;

/// Top-level error type for the enclave key channel.
#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was empty. `name` identifies the argument and
    /// `context` the operation that rejected it.
    #[error("internal error: argument '{name}' must not be empty in '{context}'")]
    EmptyArgument {
        name: &'static str,
        context: &'static str,
    },

    /// The column master key path is not on the trusted key paths list
    /// registered for the server.
    #[error(
        "column master key path '{key_path}' is not trusted for server '{server_name}'; \
         add it to the trusted key paths for this server or remove the server's list"
    )]
    UntrustedKeyPath {
        key_path: String,
        server_name: String,
    },

    /// No key store provider is registered under the requested name.
    #[error(
        "failed to find a registered key store provider named '{provider_name}'; \
         providers searched: {searched_providers}"
    )]
    UnrecognizedProvider {
        provider_name: String,
        searched_providers: String,
    },

    /// Metadata for an enclave-enabled column master key carried no signature.
    #[error("no signature found in the column master key metadata for key path '{key_path}'")]
    MasterKeySignatureNotFound { key_path: String },

    /// The provider reported the column master key metadata signature as
    /// invalid.
    #[error("column master key metadata signature verification failed for key path '{key_path}'")]
    InvalidMasterKeySignature { key_path: String },

    /// The key store provider failed while decrypting a column encryption
    /// key. The preview covers the last bytes of the *encrypted* key only.
    #[error(
        "failed to decrypt a column encryption key using key store provider '{provider_name}'; \
         the last 10 bytes of the encrypted key are '{encrypted_key_preview}'"
    )]
    KeyDecryptionFailed {
        provider_name: String,
        encrypted_key_preview: String,
        #[source]
        source: anyhow::Error,
    },

    /// The provider failed while verifying a column master key metadata
    /// signature.
    #[error("failed to verify the column master key metadata signature")]
    SignatureVerificationFailed {
        #[source]
        source: anyhow::Error,
    },

    /// The AEAD layer failed while encrypting the key package.
    #[error("failed to encrypt the key package to be sent to the enclave")]
    PackageEncryptionFailed {
        #[source]
        source: CipherError,
    },

    /// A cipher-layer failure outside the package-encryption path.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// A wire-format contract was violated.
    #[error(transparent)]
    Wire(#[from] enclave_wire::WireError),

    /// Internal invariant violation; indicates a defect, not a transient
    /// condition.
    #[error("internal error: {0}")]
    Internal(String),

    /// The whole enclave-assisted execution may be retried from scratch,
    /// e.g. because the cached session was invalidated concurrently.
    #[error("enclave query may be retried: {message}")]
    Retryable {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
}

impl Error {
    /// Returns `true` if the caller may retry the entire enclave-assisted
    /// operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable { .. })
    }

    pub(crate) fn retryable(message: impl Into<String>) -> Self {
        Error::Retryable {
            message: message.into(),
            source: None,
        }
    }
}
