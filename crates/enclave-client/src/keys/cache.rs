//! [`SymmetricKeyCache`]: memoizes decrypted column encryption keys.
//!
//! One process-wide mutex serializes every lookup and insertion, including
//! ones for unrelated keys. This guarantees a key is never decrypted twice
//! concurrently at the cost of throughput when many distinct keys miss at
//! once; shard the lock by key hash if that ever becomes the bottleneck.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

use super::{EncryptionKeyInfo, SymmetricKey};
use crate::error::Error;
use crate::provider::KeyStoreContext;

/// How many trailing bytes of an encrypted key to show in decrypt-failure
/// diagnostics.
const KEY_PREVIEW_BYTES: usize = 10;

struct CachedKey {
    key: Arc<SymmetricKey>,
    expires_at: Instant,
}

/// Process-wide cache of decrypted column encryption keys.
pub struct SymmetricKeyCache {
    entries: Mutex<HashMap<String, CachedKey>>,
}

impl SymmetricKeyCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the plaintext key for `key_info`, decrypting through the
    /// named key store provider on a miss.
    ///
    /// A zero TTL in `ctx` disables caching entirely: every call re-decrypts
    /// and nothing is inserted.
    ///
    /// # Errors
    ///
    /// - [`Error::UntrustedKeyPath`] if the master key path fails the
    ///   allow-list gate for this server.
    /// - [`Error::UnrecognizedProvider`] if no provider is registered under
    ///   the metadata's key store name.
    /// - [`Error::KeyDecryptionFailed`] wrapping any provider failure; the
    ///   message carries a truncated hex preview of the *encrypted* key.
    pub fn get_key(
        &self,
        key_info: &EncryptionKeyInfo,
        ctx: &KeyStoreContext,
    ) -> Result<Arc<SymmetricKey>, Error> {
        let lookup_key = Self::lookup_key(&ctx.server_name, key_info);

        let mut entries = self.entries.lock().expect("symmetric key cache lock poisoned");

        if let Some(cached) = entries.get(&lookup_key) {
            if cached.expires_at > Instant::now() {
                debug!(key_store = %key_info.key_store_name, "column encryption key cache hit");
                return Ok(Arc::clone(&cached.key));
            }
        }

        // Security gate before any provider contact.
        ctx.trusted_key_paths
            .ensure_trusted(&ctx.server_name, &key_info.key_path)?;

        let provider = ctx.providers.get(&key_info.key_store_name).ok_or_else(|| {
            Error::UnrecognizedProvider {
                provider_name: key_info.key_store_name.clone(),
                searched_providers: ctx.providers.searched_names(),
            }
        })?;

        let plaintext = provider
            .decrypt_column_encryption_key(
                &key_info.key_path,
                &key_info.algorithm_name,
                &key_info.encrypted_key,
            )
            .map_err(|source| Error::KeyDecryptionFailed {
                provider_name: key_info.key_store_name.clone(),
                encrypted_key_preview: hex_preview(&key_info.encrypted_key, KEY_PREVIEW_BYTES),
                source,
            })?;

        let key = Arc::new(SymmetricKey::new(plaintext)?);

        if !ctx.key_cache_ttl.is_zero() {
            entries.insert(
                lookup_key,
                CachedKey {
                    key: Arc::clone(&key),
                    expires_at: Instant::now() + ctx.key_cache_ttl,
                },
            );
        }
        debug!(key_store = %key_info.key_store_name, "column encryption key decrypted");
        Ok(key)
    }

    /// Lookup key: `server:base64(encrypted key):store name`, pre-sized from
    /// the known component lengths.
    fn lookup_key(server_name: &str, key_info: &EncryptionKeyInfo) -> String {
        let encoded_len = base64_len(key_info.encrypted_key.len());
        let mut key = String::with_capacity(
            server_name.len() + encoded_len + key_info.key_store_name.len() + 2,
        );
        key.push_str(server_name);
        key.push(':');
        BASE64.encode_string(&key_info.encrypted_key, &mut key);
        key.push(':');
        key.push_str(&key_info.key_store_name);
        key
    }
}

impl Default for SymmetricKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the base64 string representing `byte_len` bytes, padding
/// included.
fn base64_len(byte_len: usize) -> usize {
    byte_len.div_ceil(3) * 4
}

/// Uppercase-hex preview of the last `count` bytes, `0x`-prefixed and
/// ellipsis-led when truncated. Used only on *encrypted* bytes.
pub(crate) fn hex_preview(bytes: &[u8], count: usize) -> String {
    let start = bytes.len().saturating_sub(count);
    let mut preview = String::with_capacity(2 + 3 + (bytes.len() - start) * 2);
    preview.push_str("0x");
    if start > 0 {
        preview.push_str("...");
    }
    for b in &bytes[start..] {
        preview.push_str(&format!("{b:02X}"));
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::provider::{MockKeyStoreProvider, ProviderRegistry, TrustedKeyPaths};

    fn key_info() -> EncryptionKeyInfo {
        EncryptionKeyInfo {
            encrypted_key: vec![0xDE, 0xAD, 0xBE, 0xEF],
            database_id: 5,
            cek_id: 1,
            cek_version: 1,
            cek_md_version: vec![0; 8],
            key_store_name: "AZURE_KEY_VAULT".into(),
            key_path: "https://vault.example/keys/cmk1".into(),
            algorithm_name: "RSA_OAEP".into(),
        }
    }

    fn ctx_with(provider: MockKeyStoreProvider, ttl: Duration) -> KeyStoreContext {
        let providers = Arc::new(ProviderRegistry::new());
        providers.register("AZURE_KEY_VAULT", Arc::new(provider));
        KeyStoreContext {
            server_name: "tcp:server,1433".into(),
            providers,
            trusted_key_paths: Arc::new(TrustedKeyPaths::new()),
            key_cache_ttl: ttl,
        }
    }

    #[test]
    fn decrypts_once_then_serves_from_cache() {
        let mut provider = MockKeyStoreProvider::new();
        provider
            .expect_decrypt_column_encryption_key()
            .times(1)
            .returning(|_, _, _| Ok(vec![0x11; 32]));
        let ctx = ctx_with(provider, Duration::from_secs(3600));

        let cache = SymmetricKeyCache::new();
        let first = cache.get_key(&key_info(), &ctx).unwrap();
        let second = cache.get_key(&key_info(), &ctx).unwrap();
        assert_eq!(first.root_key(), second.root_key());
    }

    #[test]
    fn zero_ttl_decrypts_every_call() {
        let mut provider = MockKeyStoreProvider::new();
        provider
            .expect_decrypt_column_encryption_key()
            .times(2)
            .returning(|_, _, _| Ok(vec![0x22; 32]));
        let ctx = ctx_with(provider, Duration::ZERO);

        let cache = SymmetricKeyCache::new();
        cache.get_key(&key_info(), &ctx).unwrap();
        cache.get_key(&key_info(), &ctx).unwrap();
    }

    #[test]
    fn untrusted_key_path_fails_closed_before_provider() {
        let mut provider = MockKeyStoreProvider::new();
        provider.expect_decrypt_column_encryption_key().times(0);
        let ctx = ctx_with(provider, Duration::from_secs(3600));
        ctx.trusted_key_paths
            .set_paths("tcp:server,1433", vec!["/some/other/path".into()]);

        let err = SymmetricKeyCache::new().get_key(&key_info(), &ctx).unwrap_err();
        assert!(matches!(err, Error::UntrustedKeyPath { .. }));
    }

    #[test]
    fn unknown_provider_lists_searched_names() {
        let providers = Arc::new(ProviderRegistry::new());
        providers.register("OTHER_STORE", Arc::new(MockKeyStoreProvider::new()));
        let ctx = KeyStoreContext {
            server_name: "s".into(),
            providers,
            trusted_key_paths: Arc::new(TrustedKeyPaths::new()),
            key_cache_ttl: Duration::from_secs(1),
        };

        let err = SymmetricKeyCache::new().get_key(&key_info(), &ctx).unwrap_err();
        match err {
            Error::UnrecognizedProvider {
                provider_name,
                searched_providers,
            } => {
                assert_eq!(provider_name, "AZURE_KEY_VAULT");
                assert!(searched_providers.contains("OTHER_STORE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn provider_failure_is_wrapped_with_preview() {
        let mut provider = MockKeyStoreProvider::new();
        provider
            .expect_decrypt_column_encryption_key()
            .returning(|_, _, _| Err(anyhow::anyhow!("HSM offline")));
        let ctx = ctx_with(provider, Duration::from_secs(3600));

        let err = SymmetricKeyCache::new().get_key(&key_info(), &ctx).unwrap_err();
        match err {
            Error::KeyDecryptionFailed {
                encrypted_key_preview,
                ..
            } => assert_eq!(encrypted_key_preview, "0xDEADBEEF"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hex_preview_truncates_to_last_bytes() {
        let bytes: Vec<u8> = (0u8..16).collect();
        let preview = hex_preview(&bytes, 4);
        assert_eq!(preview, "0x...0C0D0E0F");
        assert_eq!(hex_preview(&[0xAB], 10), "0xAB");
    }

    #[test]
    fn base64_len_matches_encoder() {
        for len in 0..40 {
            let bytes = vec![0u8; len];
            assert_eq!(BASE64.encode(&bytes).len(), base64_len(len));
        }
    }
}
