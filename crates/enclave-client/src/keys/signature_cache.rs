//! [`SignatureVerificationCache`]: memoizes column master key metadata
//! signature checks.
//!
//! Signature verification costs an asymmetric-crypto operation and the
//! metadata it covers is immutable per column master key, so results are
//! cached for ten days. The cache is bounded: once the entry count exceeds
//! `CACHE_SIZE + CACHE_TRIM_THRESHOLD`, the next insertion compacts it by
//! the fractional overage, evicting least-recently-used entries first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, info};

use crate::error::Error;

/// Nominal cache capacity in entries.
pub const CACHE_SIZE: usize = 2000;

/// Entries tolerated above [`CACHE_SIZE`] before a trim is triggered.
pub const CACHE_TRIM_THRESHOLD: usize = 300;

/// Verification results expire ten days after insertion.
const ENTRY_TTL: Duration = Duration::from_secs(10 * 24 * 60 * 60);

struct SignatureEntry {
    result: bool,
    expires_at: Instant,
    /// Logical use tick for LRU ordering; updated on every hit.
    last_used: AtomicU64,
}

/// Bounded, thread-safe cache of signature verification verdicts.
///
/// Lookups and insertions go through the map's read/write lock directly;
/// trimming is additionally guarded by a compare-and-swap flag so only one
/// thread compacts while others proceed without waiting.
pub struct SignatureVerificationCache {
    entries: RwLock<HashMap<String, SignatureEntry>>,
    trim_in_progress: AtomicBool,
    use_tick: AtomicU64,
    cache_size: usize,
    trim_threshold: usize,
}

impl SignatureVerificationCache {
    /// Create a cache with the standard [`CACHE_SIZE`] /
    /// [`CACHE_TRIM_THRESHOLD`] bounds.
    pub fn new() -> Self {
        Self::with_bounds(CACHE_SIZE, CACHE_TRIM_THRESHOLD)
    }

    /// Create a cache with custom bounds.
    pub fn with_bounds(cache_size: usize, trim_threshold: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            trim_in_progress: AtomicBool::new(false),
            use_tick: AtomicU64::new(0),
            cache_size,
            trim_threshold,
        }
    }

    /// Look up a previously cached verification result.
    ///
    /// Returns `Ok(None)` on a miss or an expired entry; a miss only ever
    /// means "not yet computed".
    ///
    /// # Errors
    ///
    /// Returns an empty-argument error if `key_store_name`,
    /// `master_key_path`, or `signature` is empty.
    pub fn get(
        &self,
        key_store_name: &str,
        master_key_path: &str,
        allow_enclave_computations: bool,
        signature: &[u8],
    ) -> Result<Option<bool>, Error> {
        let key = Self::cache_key(
            key_store_name,
            master_key_path,
            allow_enclave_computations,
            signature,
            "SignatureVerificationCache::get",
        )?;

        let entries = self.entries.read().expect("signature cache lock poisoned");
        let Some(entry) = entries.get(&key) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            return Ok(None);
        }
        entry.last_used.store(
            self.use_tick.fetch_add(1, Ordering::Relaxed) + 1,
            Ordering::Relaxed,
        );
        Ok(Some(entry.result))
    }

    /// Insert a verification result with a ten-day absolute expiration,
    /// trimming first if the cache has outgrown its bounds.
    ///
    /// # Errors
    ///
    /// Returns an empty-argument error if `key_store_name`,
    /// `master_key_path`, or `signature` is empty.
    pub fn add(
        &self,
        key_store_name: &str,
        master_key_path: &str,
        allow_enclave_computations: bool,
        signature: &[u8],
        result: bool,
    ) -> Result<(), Error> {
        let key = Self::cache_key(
            key_store_name,
            master_key_path,
            allow_enclave_computations,
            signature,
            "SignatureVerificationCache::add",
        )?;

        self.trim_if_needed();

        let mut entries = self.entries.write().expect("signature cache lock poisoned");
        entries.insert(
            key,
            SignatureEntry {
                result,
                expires_at: Instant::now() + ENTRY_TTL,
                last_used: AtomicU64::new(self.use_tick.fetch_add(1, Ordering::Relaxed) + 1),
            },
        );
        Ok(())
    }

    /// Number of cached entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().expect("signature cache lock poisoned").len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compact by the fractional overage when the entry count exceeds
    /// `cache_size + trim_threshold`, unless another thread is already
    /// trimming.
    fn trim_if_needed(&self) {
        if self.len() <= self.cache_size + self.trim_threshold {
            return;
        }
        if self
            .trim_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another thread is trimming; proceed without waiting.
            return;
        }
        // Flag is reset on every exit path, including panics inside the
        // compaction below.
        let _reset = TrimFlagGuard(&self.trim_in_progress);

        let mut entries = self.entries.write().expect("signature cache lock poisoned");
        let count = entries.len();
        if count <= self.cache_size + self.trim_threshold {
            return;
        }

        let percentage = (count - self.cache_size) * 100 / count;
        let to_remove = count * percentage / 100;

        let mut by_use: Vec<(String, u64)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_used.load(Ordering::Relaxed)))
            .collect();
        by_use.sort_by_key(|(_, last_used)| *last_used);
        for (key, _) in by_use.into_iter().take(to_remove) {
            entries.remove(&key);
        }

        info!(
            removed = to_remove,
            remaining = entries.len(),
            "signature verification cache trimmed"
        );
        debug!(percentage, "trim fraction applied");
    }

    /// Key: `store:path:bool:base64(signature)`, pre-sized from the known
    /// component lengths.
    fn cache_key(
        key_store_name: &str,
        master_key_path: &str,
        allow_enclave_computations: bool,
        signature: &[u8],
        context: &'static str,
    ) -> Result<String, Error> {
        if key_store_name.is_empty() {
            return Err(Error::EmptyArgument {
                name: "key_store_name",
                context,
            });
        }
        if master_key_path.is_empty() {
            return Err(Error::EmptyArgument {
                name: "master_key_path",
                context,
            });
        }
        if signature.is_empty() {
            return Err(Error::EmptyArgument {
                name: "signature",
                context,
            });
        }

        let flag = if allow_enclave_computations {
            "true"
        } else {
            "false"
        };
        let encoded_len = signature.len().div_ceil(3) * 4;
        let mut key = String::with_capacity(
            key_store_name.len() + master_key_path.len() + flag.len() + encoded_len + 3,
        );
        key.push_str(key_store_name);
        key.push(':');
        key.push_str(master_key_path);
        key.push(':');
        key.push_str(flag);
        key.push(':');
        BASE64.encode_string(signature, &mut key);
        Ok(key)
    }
}

impl Default for SignatureVerificationCache {
    fn default() -> Self {
        Self::new()
    }
}

struct TrimFlagGuard<'a>(&'a AtomicBool);

impl Drop for TrimFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
