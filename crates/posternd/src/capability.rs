use dashmap::DashMap;
use postern_common::crypto;
use postern_common::{Commit, Id52, Preimage};
use std::collections::HashSet;

/// Per-identity set of unconsumed admission tokens.
///
/// A commit present in a set has never been consumed; `try_consume` removes
/// it under the entry's shard lock, so the membership check and removal are
/// a single indivisible operation — two concurrent sends presenting the
/// same preimage cannot both succeed. Commits have no expiry: they live
/// until consumed or until the identity re-registers and replaces the set
/// wholesale.
#[derive(Debug, Default)]
pub struct CapabilityStore {
    commits: DashMap<Id52, HashSet<Commit>>,
}

impl CapabilityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commits: DashMap::new(),
        }
    }

    /// Replace the stored commit set for an identity wholesale. Called at
    /// every verified I_AM; commits absent from the new set are gone even
    /// if they were never consumed.
    pub fn install(&self, id52: Id52, commits: Vec<Commit>) {
        self.commits.insert(id52, commits.into_iter().collect());
    }

    /// Hash the preimage and atomically check-and-remove the matching
    /// commit. Returns `true` exactly once per installed commit.
    #[must_use]
    pub fn try_consume(&self, id52: &Id52, preimage: &Preimage) -> bool {
        let commit = crypto::commit_of(preimage);
        match self.commits.get_mut(id52) {
            Some(mut entry) => entry.remove(&commit),
            None => false,
        }
    }

    /// Number of unconsumed commits held for an identity.
    #[must_use]
    pub fn remaining(&self, id52: &Id52) -> usize {
        self.commits.get(id52).map_or(0, |entry| entry.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_id(id: u8) -> Id52 {
        let mut key = [0u8; 32];
        key[0] = id;
        key
    }

    #[test]
    fn consume_succeeds_once_then_fails() {
        let store = CapabilityStore::new();
        let id = make_id(1);
        let preimage = [7u8; 32];
        store.install(id, vec![crypto::commit_of(&preimage)]);

        assert!(store.try_consume(&id, &preimage));
        assert!(!store.try_consume(&id, &preimage));
    }

    #[test]
    fn unknown_preimage_fails() {
        let store = CapabilityStore::new();
        let id = make_id(1);
        store.install(id, vec![crypto::commit_of(&[1u8; 32])]);

        assert!(!store.try_consume(&id, &[2u8; 32]));
        assert_eq!(store.remaining(&id), 1);
    }

    #[test]
    fn unknown_identity_fails() {
        let store = CapabilityStore::new();
        assert!(!store.try_consume(&make_id(1), &[1u8; 32]));
    }

    #[test]
    fn install_replaces_rather_than_merges() {
        let store = CapabilityStore::new();
        let id = make_id(1);
        let old_preimage = [1u8; 32];
        let new_preimage = [2u8; 32];

        store.install(id, vec![crypto::commit_of(&old_preimage)]);
        store.install(id, vec![crypto::commit_of(&new_preimage)]);

        assert!(!store.try_consume(&id, &old_preimage));
        assert!(store.try_consume(&id, &new_preimage));
    }

    #[test]
    fn identities_are_independent() {
        let store = CapabilityStore::new();
        let preimage = [9u8; 32];
        store.install(make_id(1), vec![crypto::commit_of(&preimage)]);
        store.install(make_id(2), vec![crypto::commit_of(&preimage)]);

        assert!(store.try_consume(&make_id(1), &preimage));
        assert!(store.try_consume(&make_id(2), &preimage));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_consumption_succeeds_exactly_once() {
        let store = Arc::new(CapabilityStore::new());
        let id = make_id(1);
        let preimage = [5u8; 32];
        store.install(id, vec![crypto::commit_of(&preimage)]);

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(
                async move { store.try_consume(&id, &preimage) },
            ));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}
