//! Column master key metadata verification.
//!
//! Before a column master key may be used for enclave computations, the
//! signature over its metadata (key path + the `allow enclave computations`
//! flag) must check out against the key itself. The check costs an
//! asymmetric-crypto operation, so verdicts are memoized in a
//! [`SignatureVerificationCache`].

use tracing::debug;

use crate::error::Error;
use crate::keys::SignatureVerificationCache;
use crate::provider::KeyStoreContext;

/// Verify the metadata signature of a column master key, consulting `cache`
/// before the provider.
///
/// # Errors
///
/// - [`Error::MasterKeySignatureNotFound`] if `signature` is empty; a
///   column master key without a signature must not be trusted for enclave
///   computations.
/// - [`Error::UnrecognizedProvider`] if `key_store_name` has no registered
///   provider.
/// - [`Error::SignatureVerificationFailed`] wrapping any provider failure.
/// - [`Error::InvalidMasterKeySignature`] if the signature does not verify.
pub fn verify_column_master_key_metadata(
    key_store_name: &str,
    key_path: &str,
    allow_enclave_computations: bool,
    signature: &[u8],
    ctx: &KeyStoreContext,
    cache: &SignatureVerificationCache,
) -> Result<(), Error> {
    if signature.is_empty() {
        return Err(Error::MasterKeySignatureNotFound {
            key_path: key_path.to_owned(),
        });
    }

    let provider = ctx
        .providers
        .get(key_store_name)
        .ok_or_else(|| Error::UnrecognizedProvider {
            provider_name: key_store_name.to_owned(),
            searched_providers: ctx.providers.searched_names(),
        })?;

    let verdict = match cache.get(key_store_name, key_path, allow_enclave_computations, signature)?
    {
        Some(cached) => {
            debug!(key_store = key_store_name, "signature verification cache hit");
            cached
        }
        None => {
            let verdict = provider
                .verify_column_master_key_metadata(key_path, allow_enclave_computations, signature)
                .map_err(|source| Error::SignatureVerificationFailed { source })?;
            cache.add(
                key_store_name,
                key_path,
                allow_enclave_computations,
                signature,
                verdict,
            )?;
            verdict
        }
    };

    if verdict {
        Ok(())
    } else {
        Err(Error::InvalidMasterKeySignature {
            key_path: key_path.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::provider::{MockKeyStoreProvider, ProviderRegistry, TrustedKeyPaths};

    const STORE: &str = "AZURE_KEY_VAULT";
    const PATH: &str = "https://vault.example/keys/cmk1";

    fn ctx_with(provider: MockKeyStoreProvider) -> KeyStoreContext {
        let providers = Arc::new(ProviderRegistry::new());
        providers.register(STORE, Arc::new(provider));
        KeyStoreContext {
            server_name: "s".into(),
            providers,
            trusted_key_paths: Arc::new(TrustedKeyPaths::new()),
            key_cache_ttl: Duration::from_secs(1),
        }
    }

    #[test]
    fn verifies_once_then_serves_from_cache() {
        let mut provider = MockKeyStoreProvider::new();
        provider
            .expect_verify_column_master_key_metadata()
            .times(1)
            .returning(|_, _, _| Ok(true));
        let ctx = ctx_with(provider);
        let cache = SignatureVerificationCache::new();
        let signature = vec![0x5A; 64];

        verify_column_master_key_metadata(STORE, PATH, true, &signature, &ctx, &cache).unwrap();
        // Second call must not reach the provider (times(1) above).
        verify_column_master_key_metadata(STORE, PATH, true, &signature, &ctx, &cache).unwrap();
    }

    #[test]
    fn invalid_signature_fails_closed_and_is_cached() {
        let mut provider = MockKeyStoreProvider::new();
        provider
            .expect_verify_column_master_key_metadata()
            .times(1)
            .returning(|_, _, _| Ok(false));
        let ctx = ctx_with(provider);
        let cache = SignatureVerificationCache::new();

        for _ in 0..2 {
            let err =
                verify_column_master_key_metadata(STORE, PATH, true, &[1, 2, 3], &ctx, &cache)
                    .unwrap_err();
            assert!(matches!(err, Error::InvalidMasterKeySignature { .. }));
        }
    }

    #[test]
    fn missing_signature_is_rejected_before_provider() {
        let mut provider = MockKeyStoreProvider::new();
        provider.expect_verify_column_master_key_metadata().times(0);
        let ctx = ctx_with(provider);
        let cache = SignatureVerificationCache::new();

        let err = verify_column_master_key_metadata(STORE, PATH, true, &[], &ctx, &cache)
            .unwrap_err();
        assert!(matches!(err, Error::MasterKeySignatureNotFound { .. }));
    }

    #[test]
    fn unknown_provider_is_a_configuration_error() {
        let ctx = KeyStoreContext {
            server_name: "s".into(),
            providers: Arc::new(ProviderRegistry::new()),
            trusted_key_paths: Arc::new(TrustedKeyPaths::new()),
            key_cache_ttl: Duration::from_secs(1),
        };
        let err = verify_column_master_key_metadata(
            "NOT_REGISTERED",
            PATH,
            true,
            &[1],
            &ctx,
            &SignatureVerificationCache::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnrecognizedProvider { .. }));
    }

    #[test]
    fn provider_failure_is_wrapped() {
        let mut provider = MockKeyStoreProvider::new();
        provider
            .expect_verify_column_master_key_metadata()
            .returning(|_, _, _| Err(anyhow::anyhow!("vault timeout")));
        let ctx = ctx_with(provider);

        let err = verify_column_master_key_metadata(
            STORE,
            PATH,
            false,
            &[9],
            &ctx,
            &SignatureVerificationCache::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SignatureVerificationFailed { .. }));
    }
}
