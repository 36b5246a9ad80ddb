use dashmap::DashMap;
use postern_common::Preimage;
use std::time::{Duration, Instant};

/// A cached acknowledgment payload with its eviction deadline.
#[derive(Debug, Clone)]
struct CachedResponse {
    response: Vec<u8>,
    expires_at: Instant,
}

/// Global, preimage-keyed cache of recently produced responses.
///
/// Keyed by preimage alone — the preimage is unguessable and unique, so no
/// recipient scoping is needed, and a sender can retry against any relay
/// that holds the entry. `take` evicts on hit: once a retry has consumed
/// the cached answer it is gone, so a stale result cannot be replayed
/// indefinitely. Entries also disappear at or before their TTL via the
/// periodic sweep.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<Preimage, CachedResponse>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a cache whose entries live for `ttl` after insertion.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Remove and return the entry for a preimage, if present and unexpired.
    /// Expired entries encountered here are dropped, never returned.
    #[must_use]
    pub fn take(&self, preimage: &Preimage) -> Option<Vec<u8>> {
        let (_, cached) = self.entries.remove(preimage)?;
        if cached.expires_at > Instant::now() {
            Some(cached.response)
        } else {
            None
        }
    }

    /// Insert a response under its originating preimage.
    pub fn store(&self, preimage: Preimage, response: Vec<u8>) {
        self.entries.insert(
            preimage,
            CachedResponse {
                response,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every expired entry. Called from the maintenance task.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, v| v.expires_at > now);
    }

    /// Number of live entries (including any not yet swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
