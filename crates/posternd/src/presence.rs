use dashmap::DashMap;
use ed25519_dalek::VerifyingKey;
use postern_common::types::PresenceRecord;
use postern_common::{crypto, Id52};
use rand::seq::IteratorRandom;

/// Clock skew tolerated on a record's `issued_at` before it counts as
/// future-dated. A future timestamp would otherwise outlive every prune
/// for as long as it stays ahead of the relay clock.
const MAX_ISSUED_AT_SKEW: u64 = 300;

/// Why a presence record was not admitted into the store.
#[derive(Debug, PartialEq, Eq)]
pub enum PresenceReject {
    /// Signature does not verify against the asserted identity.
    BadSignature,
    /// The asserting id52 is not a valid Ed25519 public key.
    BadKey,
    /// TTL already elapsed at the time of observation.
    Expired,
    /// TTL exceeds the relay's accepted cap.
    TtlTooLong,
    /// `issued_at` lies beyond the tolerated clock skew.
    FutureDated,
    /// A record with the same or newer `issued_at` is already held.
    Stale,
}

/// Store of signed presence assertions, gossiped between connected peers.
///
/// The relay never originates or extends a record; it only admits records
/// whose signature verifies and whose TTL is live and within the cap, and
/// re-forwards them verbatim. Per identity, the newest `issued_at` wins.
#[derive(Debug)]
pub struct PresenceStore {
    records: DashMap<Id52, PresenceRecord>,
    ttl_cap: u64,
}

impl PresenceStore {
    /// Create a store that rejects records with a TTL above `ttl_cap` seconds.
    #[must_use]
    pub fn new(ttl_cap: u64) -> Self {
        Self {
            records: DashMap::new(),
            ttl_cap,
        }
    }

    /// Validate and admit a record observed at Unix time `now`.
    ///
    /// `Ok(())` means the record was stored and is worth re-gossiping;
    /// any `Err` means it was dropped.
    pub fn observe(&self, record: PresenceRecord, now: u64) -> Result<(), PresenceReject> {
        if u64::from(record.ttl_secs) > self.ttl_cap {
            return Err(PresenceReject::TtlTooLong);
        }
        if record.is_expired(now) {
            return Err(PresenceReject::Expired);
        }
        if record.issued_at > now.saturating_add(MAX_ISSUED_AT_SKEW) {
            return Err(PresenceReject::FutureDated);
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(&record.id52) else {
            return Err(PresenceReject::BadKey);
        };
        if !crypto::verify_presence(
            &verifying_key,
            &record.id52,
            &record.relay,
            record.issued_at,
            record.ttl_secs,
            &record.signature,
        ) {
            return Err(PresenceReject::BadSignature);
        }

        // Replay of an old assertion must not roll back a newer one.
        let mut stale = false;
        self.records
            .entry(record.id52)
            .and_modify(|held| {
                if record.issued_at > held.issued_at {
                    *held = record.clone();
                } else {
                    stale = true;
                }
            })
            .or_insert_with(|| record.clone());
        if stale {
            Err(PresenceReject::Stale)
        } else {
            Ok(())
        }
    }

    /// Look up the live record for an identity, if any.
    #[must_use]
    pub fn lookup(&self, id52: &Id52, now: u64) -> Option<PresenceRecord> {
        let entry = self.records.get(id52)?;
        if entry.is_expired(now) {
            None
        } else {
            Some(entry.clone())
        }
    }

    /// Sample up to `n` distinct live records uniformly at random, for a
    /// gossip round.
    #[must_use]
    pub fn sample(&self, n: usize, now: u64) -> Vec<PresenceRecord> {
        let mut rng = rand::thread_rng();
        self.records
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value().clone())
            .choose_multiple(&mut rng, n)
    }

    /// Drop every expired record. Called from the maintenance task.
    pub fn prune(&self, now: u64) {
        self.records.retain(|_, record| !record.is_expired(now));
    }

    /// Number of held records (including any not yet pruned).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
