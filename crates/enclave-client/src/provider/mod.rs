//! Key store providers and the trust configuration around them.
//!
//! A [`KeyStoreProvider`] fronts an external key vault (HSM, cloud vault,
//! certificate store) that can decrypt column encryption keys and verify
//! column master key metadata signatures. Providers are registered once per
//! process in a [`ProviderRegistry`]; lookups on the decrypt hot path are
//! lock-free.
//!
//! [`TrustedKeyPaths`] is the allow-list gate in front of every decryption:
//! once a server has a registered list, any master key path not on it is
//! rejected before the provider is ever contacted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::Settings;
use crate::error::Error;

/// External key store backend, e.g. a cloud key vault or local certificate
/// store. Implementations may block on I/O and may fail for I/O or
/// cryptographic reasons; the core wraps those failures with context.
#[cfg_attr(test, mockall::automock)]
pub trait KeyStoreProvider: Send + Sync {
    /// Decrypt an encrypted column encryption key using the column master
    /// key at `master_key_path`.
    fn decrypt_column_encryption_key(
        &self,
        master_key_path: &str,
        algorithm: &str,
        encrypted_key: &[u8],
    ) -> anyhow::Result<Vec<u8>>;

    /// Verify the signature over a column master key's metadata
    /// (key path + `allow_enclave_computations` flag).
    fn verify_column_master_key_metadata(
        &self,
        master_key_path: &str,
        allow_enclave_computations: bool,
        signature: &[u8],
    ) -> anyhow::Result<bool>;
}

/// Shared, lock-free registry of key store providers keyed by name.
///
/// Backed by [`ArcSwap`] so decrypt-path lookups never block while
/// registration atomically swaps in a new map.
pub struct ProviderRegistry {
    inner: ArcSwap<HashMap<String, Arc<dyn KeyStoreProvider>>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Register (or replace) a provider under `name`.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn KeyStoreProvider>) {
        let name = name.into();
        self.inner.rcu(|current| {
            let mut next: HashMap<_, _> = HashMap::clone(current);
            next.insert(name.clone(), Arc::clone(&provider));
            next
        });
    }

    /// Look up a provider by name. Lock-free.
    pub fn get(&self, name: &str) -> Option<Arc<dyn KeyStoreProvider>> {
        self.inner.load().get(name).cloned()
    }

    /// Names of all registered providers, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Comma-separated provider names for error messages.
    pub(crate) fn searched_names(&self) -> String {
        let names = self.names();
        if names.is_empty() {
            "(none registered)".to_owned()
        } else {
            names.join(", ")
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-server allow-lists of trusted column master key paths.
///
/// Enforcement is scoped: a server with no registered list accepts any path;
/// a server with a list rejects everything not on it. Server names and key
/// paths compare case-insensitively.
pub struct TrustedKeyPaths {
    inner: ArcSwap<HashMap<String, Vec<String>>>,
}

impl TrustedKeyPaths {
    /// Create a registry with no allow-lists (all paths trusted).
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Install (or replace) the allow-list for `server_name`.
    pub fn set_paths(&self, server_name: &str, paths: Vec<String>) {
        let key = server_name.to_lowercase();
        self.inner.rcu(|current| {
            let mut next: HashMap<_, _> = HashMap::clone(current);
            next.insert(key.clone(), paths.clone());
            next
        });
    }

    /// Fail closed if `server_name` has an allow-list and `key_path` is not
    /// on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UntrustedKeyPath`] when the path is rejected.
    pub fn ensure_trusted(&self, server_name: &str, key_path: &str) -> Result<(), Error> {
        let lists = self.inner.load();
        let Some(trusted) = lists.get(&server_name.to_lowercase()) else {
            return Ok(());
        };
        let known = trusted
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(key_path));
        if known {
            Ok(())
        } else {
            Err(Error::UntrustedKeyPath {
                key_path: key_path.to_owned(),
                server_name: server_name.to_owned(),
            })
        }
    }
}

impl Default for TrustedKeyPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a cache-miss decrypt needs to reach the outside world: which
/// server the query runs against, the provider registry, the trusted-path
/// gate, and the global key-cache TTL.
#[derive(Clone)]
pub struct KeyStoreContext {
    pub server_name: String,
    pub providers: Arc<ProviderRegistry>,
    pub trusted_key_paths: Arc<TrustedKeyPaths>,
    /// TTL for cached plaintext keys; `Duration::ZERO` disables caching.
    pub key_cache_ttl: Duration,
}

impl KeyStoreContext {
    /// Assemble a context from validated [`Settings`] and shared registries.
    pub fn new(
        server_name: impl Into<String>,
        settings: &Settings,
        providers: Arc<ProviderRegistry>,
        trusted_key_paths: Arc<TrustedKeyPaths>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            providers,
            trusted_key_paths,
            key_cache_ttl: Duration::from_secs(settings.key_cache_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let registry = ProviderRegistry::new();
        assert!(registry.get("AZURE_KEY_VAULT").is_none());

        let mut mock = MockKeyStoreProvider::new();
        mock.expect_decrypt_column_encryption_key()
            .returning(|_, _, _| Ok(vec![1, 2, 3]));
        registry.register("AZURE_KEY_VAULT", Arc::new(mock));

        let provider = registry.get("AZURE_KEY_VAULT").expect("registered");
        let plaintext = provider
            .decrypt_column_encryption_key("/key/path", "RSA_OAEP", &[9])
            .unwrap();
        assert_eq!(plaintext, vec![1, 2, 3]);
    }

    #[test]
    fn names_are_sorted_for_diagnostics() {
        let registry = ProviderRegistry::new();
        registry.register("ZULU", Arc::new(MockKeyStoreProvider::new()));
        registry.register("ALPHA", Arc::new(MockKeyStoreProvider::new()));
        assert_eq!(registry.names(), vec!["ALPHA", "ZULU"]);
        assert_eq!(registry.searched_names(), "ALPHA, ZULU");
    }

    #[test]
    fn empty_registry_reports_none_searched() {
        assert_eq!(ProviderRegistry::new().searched_names(), "(none registered)");
    }

    #[test]
    fn unregistered_server_trusts_everything() {
        let trusted = TrustedKeyPaths::new();
        assert!(trusted.ensure_trusted("server", "/any/path").is_ok());
    }

    #[test]
    fn registered_server_fails_closed() {
        let trusted = TrustedKeyPaths::new();
        trusted.set_paths("Server", vec!["/vault/cmk1".into()]);

        assert!(trusted.ensure_trusted("server", "/vault/cmk1").is_ok());
        // Path comparison ignores case.
        assert!(trusted.ensure_trusted("SERVER", "/VAULT/CMK1").is_ok());

        let err = trusted.ensure_trusted("server", "/vault/other").unwrap_err();
        assert!(matches!(err, Error::UntrustedKeyPath { .. }));
    }
}
