//! [`EnclaveSessionCache`]: one active trust session per (server, database,
//! attestation URL), with the anti-replay counter.
//!
//! The counter gives every key-package build a fresh, strictly increasing
//! nonce so the server cannot replay a previously captured package against
//! the enclave. It advances on every lookup as well as every creation and is
//! never reused for two packages on the same session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{EnclaveSession, EnclaveSessionParameters};

/// Sessions expire 8 hours after creation, matching the validity window of
/// the attestation tokens they were established with.
const SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

struct CachedSession {
    session: Arc<EnclaveSession>,
    expires_at: Instant,
}

/// Thread-safe cache of enclave trust sessions.
///
/// Lookups take only the read side of the map lock plus one atomic counter
/// increment. `create_session` and `invalidate_session` share the write side
/// as their mutual-exclusion region, so replacement and invalidation are
/// serialized (last writer wins).
pub struct EnclaveSessionCache {
    sessions: RwLock<HashMap<String, CachedSession>>,
    counter: AtomicU64,
    ttl: Duration,
}

impl EnclaveSessionCache {
    /// Create an empty cache with the standard 8-hour session lifetime.
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    /// Create an empty cache with a custom session lifetime.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
            ttl,
        }
    }

    /// Look up the session for `params`, if one is cached and unexpired.
    ///
    /// Always returns a fresh counter value, hit or miss.
    pub fn get_session(
        &self,
        params: &EnclaveSessionParameters,
    ) -> (Option<Arc<EnclaveSession>>, u64) {
        let key = params.cache_key();
        let session = {
            let sessions = self.sessions.read().expect("session cache lock poisoned");
            sessions
                .get(&key)
                .filter(|entry| entry.expires_at > Instant::now())
                .map(|entry| Arc::clone(&entry.session))
        };
        let counter = self.next_counter();
        debug!(
            server = %params.server_name,
            hit = session.is_some(),
            counter,
            "enclave session lookup"
        );
        (session, counter)
    }

    /// Install a freshly negotiated session, replacing any prior entry for
    /// the same parameters.
    pub fn create_session(
        &self,
        params: &EnclaveSessionParameters,
        shared_secret: Vec<u8>,
        session_id: u64,
    ) -> (Arc<EnclaveSession>, u64) {
        let key = params.cache_key();
        let session = Arc::new(EnclaveSession::new(shared_secret, session_id));
        let counter;
        {
            let mut sessions = self.sessions.write().expect("session cache lock poisoned");
            sessions.insert(
                key,
                CachedSession {
                    session: Arc::clone(&session),
                    expires_at: Instant::now() + self.ttl,
                },
            );
            counter = self.next_counter();
        }
        info!(
            server = %params.server_name,
            database = %params.database_name,
            session_id,
            "enclave session created"
        );
        (session, counter)
    }

    /// Remove the cached session for `params` iff it is the same session the
    /// caller observed failing. A stale invalidation (the entry was already
    /// replaced by another thread) is a no-op.
    pub fn invalidate_session(
        &self,
        params: &EnclaveSessionParameters,
        session_to_invalidate: &EnclaveSession,
    ) {
        let key = params.cache_key();
        let mut sessions = self.sessions.write().expect("session cache lock poisoned");
        let matches = sessions
            .get(&key)
            .is_some_and(|entry| entry.session.session_id() == session_to_invalidate.session_id());
        if matches {
            let removed = sessions.remove(&key);
            // The entry was read under this same write lock; failing to
            // remove it now is a cache-consistency defect.
            assert!(
                removed.is_some(),
                "enclave session cache entry disappeared while holding the cache lock"
            );
            info!(
                server = %params.server_name,
                session_id = session_to_invalidate.session_id(),
                "enclave session invalidated"
            );
        }
    }

    fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for EnclaveSessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EnclaveSessionParameters {
        EnclaveSessionParameters::new("tcp:server,1433", "orders", "https://attest.example/hgs")
    }

    #[test]
    fn create_then_get_returns_same_session() {
        let cache = EnclaveSessionCache::new();
        let secret = vec![0x42u8; 32];
        let (created, _) = cache.create_session(&params(), secret.clone(), 7);

        let (found, _) = cache.get_session(&params());
        let found = found.expect("session should be cached");
        assert_eq!(found.session_id(), 7);
        assert_eq!(found.session_key(), secret.as_slice());
        assert_eq!(created.session_id(), found.session_id());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let cache = EnclaveSessionCache::new();
        cache.create_session(&params(), vec![1; 32], 1);
        let shouted = EnclaveSessionParameters::new(
            "TCP:SERVER,1433",
            "ORDERS",
            "HTTPS://ATTEST.EXAMPLE/HGS",
        );
        let (found, _) = cache.get_session(&shouted);
        assert!(found.is_some());
    }

    #[test]
    fn counter_strictly_increases_across_calls() {
        let cache = EnclaveSessionCache::new();
        let mut last = 0;
        for _ in 0..5 {
            let (_, counter) = cache.get_session(&params());
            assert!(counter > last);
            last = counter;
        }
        let (_, counter) = cache.create_session(&params(), vec![1; 32], 1);
        assert!(counter > last);
        last = counter;
        let (_, counter) = cache.get_session(&params());
        assert!(counter > last);
    }

    #[test]
    fn invalidate_removes_only_matching_session() {
        let cache = EnclaveSessionCache::new();
        let (first, _) = cache.create_session(&params(), vec![1; 32], 1);
        // Another thread already replaced the session.
        cache.create_session(&params(), vec![2; 32], 2);

        // Stale invalidation is a no-op.
        cache.invalidate_session(&params(), &first);
        let (found, _) = cache.get_session(&params());
        assert_eq!(found.expect("replacement must survive").session_id(), 2);

        // Matching invalidation removes the entry.
        let (current, _) = cache.get_session(&params());
        cache.invalidate_session(&params(), &current.unwrap());
        let (found, _) = cache.get_session(&params());
        assert!(found.is_none());
    }

    #[test]
    fn expired_session_is_a_miss() {
        let cache = EnclaveSessionCache::with_ttl(Duration::ZERO);
        cache.create_session(&params(), vec![1; 32], 1);
        let (found, counter) = cache.get_session(&params());
        assert!(found.is_none());
        assert!(counter > 0);
    }

    #[test]
    fn replacement_wins_over_prior_entry() {
        let cache = EnclaveSessionCache::new();
        cache.create_session(&params(), vec![1; 32], 10);
        cache.create_session(&params(), vec![2; 32], 20);
        let (found, _) = cache.get_session(&params());
        assert_eq!(found.unwrap().session_id(), 20);
    }
}
