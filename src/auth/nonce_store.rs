//! Replay cache for single-use authentication nonces
//!
//! Process-local and best-effort: a restart forgets every nonce, which only
//! shortens the replay window. Deployments that run several instances should
//! back [`NonceStore`] with a shared store instead.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Maximum number of live nonces held in memory
pub const NONCE_MAX_ENTRIES: usize = 10_000;

/// Expired entries are swept once every this many inserts
const SWEEP_INTERVAL: u64 = 200;

/// Storage backend for seen nonces.
///
/// `insert_if_absent` must be atomic: two concurrent calls with the same token
/// may never both return `true` while the first record is live.
pub trait NonceStore: Send + Sync {
    /// Record `token` until `now + ttl`. Returns `false` if a live record
    /// already exists.
    fn insert_if_absent(&self, token: &str, ttl: Duration, now: u64) -> bool;

    /// Drop every record whose expiry is at or before `now`.
    fn sweep_expired(&self, now: u64);

    /// Number of records currently held (live or not yet swept).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct Entries {
    /// token -> expiry (unix seconds)
    expiry: HashMap<String, u64>,
    /// Insertion order, oldest first. May hold stale pairs for tokens that
    /// were swept or re-inserted; those are skipped on eviction.
    order: VecDeque<(String, u64)>,
    inserts: u64,
}

impl Entries {
    fn evict_oldest(&mut self) -> bool {
        while let Some((token, expires_at)) = self.order.pop_front() {
            if self.expiry.get(&token) == Some(&expires_at) {
                self.expiry.remove(&token);
                return true;
            }
        }
        false
    }

    fn sweep(&mut self, now: u64) {
        self.expiry.retain(|_, expires_at| *expires_at > now);
        let expiry = &self.expiry;
        self.order
            .retain(|(token, expires_at)| expiry.get(token) == Some(expires_at));
    }
}

/// Bounded in-memory nonce store guarded by a mutex.
///
/// The lock is never held across an `.await`, so check-and-insert is atomic
/// for both multi-threaded and cooperative runtimes.
pub struct InMemoryNonceStore {
    entries: Mutex<Entries>,
    max_entries: usize,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::with_capacity(NONCE_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        // A poisoned lock only means another request panicked mid-insert; the
        // map itself is still structurally valid.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn insert_if_absent(&self, token: &str, ttl: Duration, now: u64) -> bool {
        let mut entries = self.lock();

        if let Some(&expires_at) = entries.expiry.get(token) {
            if expires_at > now {
                return false;
            }
        }

        let expires_at = now.saturating_add(ttl.as_secs());
        entries.expiry.insert(token.to_string(), expires_at);
        entries.order.push_back((token.to_string(), expires_at));

        entries.inserts += 1;
        if entries.inserts % SWEEP_INTERVAL == 0 {
            entries.sweep(now);
        }

        while entries.expiry.len() > self.max_entries {
            if !entries.evict_oldest() {
                break;
            }
        }

        true
    }

    fn sweep_expired(&self, now: u64) {
        self.lock().sweep(now);
    }

    fn len(&self) -> usize {
        self.lock().expiry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(120);

    #[test]
    fn second_insert_of_live_token_is_rejected() {
        let store = InMemoryNonceStore::new();
        assert!(store.insert_if_absent("nonce-aaaaaaaaaaaaaaaa", TTL, 1_000));
        assert!(!store.insert_if_absent("nonce-aaaaaaaaaaaaaaaa", TTL, 1_050));
    }

    #[test]
    fn token_is_accepted_again_after_expiry() {
        let store = InMemoryNonceStore::new();
        assert!(store.insert_if_absent("nonce-aaaaaaaaaaaaaaaa", TTL, 1_000));
        assert!(!store.insert_if_absent("nonce-aaaaaaaaaaaaaaaa", TTL, 1_119));
        assert!(store.insert_if_absent("nonce-aaaaaaaaaaaaaaaa", TTL, 1_120));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let store = InMemoryNonceStore::with_capacity(3);
        for (i, token) in ["a", "b", "c", "d"].iter().enumerate() {
            assert!(store.insert_if_absent(token, TTL, 1_000 + i as u64));
        }
        assert_eq!(store.len(), 3);
        // "a" was evicted, so it is accepted again; "d" is still live
        assert!(store.insert_if_absent("a", TTL, 1_010));
        assert!(!store.insert_if_absent("d", TTL, 1_010));
    }

    #[test]
    fn reinserted_token_is_not_evicted_by_its_stale_slot() {
        let store = InMemoryNonceStore::with_capacity(2);
        assert!(store.insert_if_absent("a", Duration::from_secs(10), 0));
        assert!(store.insert_if_absent("b", TTL, 1));
        // "a" expired and is recorded again at the back of the queue
        assert!(store.insert_if_absent("a", TTL, 20));
        assert!(store.insert_if_absent("c", TTL, 21));
        // capacity 2: "b" is now the oldest live entry and goes first
        assert!(!store.insert_if_absent("a", TTL, 22));
        assert!(store.insert_if_absent("b", TTL, 22));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = InMemoryNonceStore::new();
        store.insert_if_absent("short", Duration::from_secs(5), 100);
        store.insert_if_absent("long", TTL, 100);
        store.sweep_expired(105);
        assert_eq!(store.len(), 1);
        assert!(!store.insert_if_absent("long", TTL, 106));
    }

    #[test]
    fn periodic_sweep_runs_during_inserts() {
        let store = InMemoryNonceStore::new();
        for i in 0..(SWEEP_INTERVAL - 1) {
            store.insert_if_absent(&format!("old-{i}"), Duration::from_secs(1), 0);
        }
        assert_eq!(store.len() as u64, SWEEP_INTERVAL - 1);
        // the 200th insert triggers a sweep at t=10, clearing the old batch
        store.insert_if_absent("fresh", TTL, 10);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn concurrent_inserts_of_same_token_admit_exactly_one() {
        let store = Arc::new(InMemoryNonceStore::new());
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if store.insert_if_absent("racing-nonce-0000000", TTL, 1_000) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
