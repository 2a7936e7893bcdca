//! Concurrent map from client key to token bucket.
//!
//! Lookups share a read lock; only insertion and eviction take the write lock.
//! Each entry serializes its own token arithmetic behind a mutex, so per-key
//! accounting is linearizable without holding the map lock while consuming.

use super::token_bucket::TokenBucket;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// One client's bucket plus the time it was last looked up
#[derive(Debug)]
pub struct RegistryEntry {
    bucket: Mutex<TokenBucket>,

    /// Used only for eviction eligibility, independent of refill timing
    last_access: Mutex<Instant>,
}

impl RegistryEntry {
    fn new(bucket: TokenBucket, now: Instant) -> Self {
        Self {
            bucket: Mutex::new(bucket),
            last_access: Mutex::new(now),
        }
    }

    /// Exclusive access to the bucket
    pub fn bucket(&self) -> parking_lot::MutexGuard<'_, TokenBucket> {
        self.bucket.lock()
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }

    fn touch(&self, now: Instant) {
        let mut last = self.last_access.lock();
        // Concurrent callers may arrive out of clock order
        if now > *last {
            *last = now;
        }
    }
}

/// Registry of per-client buckets sharing one capacity and refill rate
#[derive(Debug)]
pub struct BucketRegistry {
    entries: RwLock<HashMap<String, Arc<RegistryEntry>>>,
    capacity: f64,
    refill_rate: f64,
}

impl BucketRegistry {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            refill_rate,
        }
    }

    /// Look up the entry for `key`, creating a full bucket on first sight.
    ///
    /// Returns the entry and whether this call created it. Exactly one entry
    /// is ever created per key while it stays in the registry. The access time
    /// is recorded while a map lock is still held, so a concurrent eviction
    /// cannot remove the entry between lookup and touch.
    pub fn get_or_create(&self, key: &str, now: Instant) -> (Arc<RegistryEntry>, bool) {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                entry.touch(now);
                return (Arc::clone(entry), false);
            }
        }

        let mut entries = self.entries.write();
        // Another caller may have inserted between the two locks
        if let Some(entry) = entries.get(key) {
            entry.touch(now);
            return (Arc::clone(entry), false);
        }

        let entry = Arc::new(RegistryEntry::new(
            TokenBucket::new(self.capacity, self.refill_rate, now),
            now,
        ));
        entries.insert(key.to_string(), Arc::clone(&entry));
        debug!(key, "Created token bucket");
        (entry, true)
    }

    /// Remove entries idle for longer than `retention`. Returns how many were removed.
    ///
    /// Blocks all registry access while it runs; keep it off the request path.
    pub fn evict_idle(&self, now: Instant, retention: Duration) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_access()) <= retention);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}
