use dashmap::DashMap;
use postern_common::Id52;
use rand::seq::IteratorRandom;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Handle held in the binding table — used to queue frames onto a
/// connection's write channel and to tear it down on displacement.
#[derive(Clone, Debug)]
pub struct ConnHandle {
    /// Channel sender for serialized frames destined for this connection.
    pub tx: mpsc::Sender<Vec<u8>>,
    /// Identity this connection is bound to.
    pub id52: Id52,
    /// Instant when this binding was established. A rebind produces a new
    /// epoch, so removal and pending-send failure only ever hit the
    /// binding they belong to.
    pub bound_at: Instant,
    /// Cancelled to close the connection when a newer binding displaces it.
    pub cancel: CancellationToken,
}

/// Concurrent id52 → connection binding table.
///
/// Bindings are ephemeral: established by a verified I_AM, destroyed on
/// disconnect or displacement. Only one live connection per identity is
/// authoritative at a time.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: DashMap<Id52, ConnHandle>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// Bind an identity to a connection, returning any displaced handle for
    /// the same identity. The caller is responsible for cancelling the
    /// displaced connection and failing its in-flight deliveries.
    #[must_use]
    pub fn bind(&self, id52: Id52, handle: ConnHandle) -> Option<ConnHandle> {
        self.bindings.insert(id52, handle)
    }

    /// Remove a binding only if it still belongs to the given epoch.
    /// A stale disconnect cannot evict a fresher binding this way.
    pub fn unbind_if(&self, id52: &Id52, bound_at: Instant) {
        self.bindings
            .remove_if(id52, |_k, v| v.bound_at == bound_at);
    }

    /// Look up the live connection bound to an identity.
    #[must_use]
    pub fn get(&self, id52: &Id52) -> Option<ConnHandle> {
        self.bindings.get(id52).map(|entry| entry.value().clone())
    }

    /// Sample up to `n` distinct bound connections uniformly at random,
    /// excluding `skip`. Used by presence gossip.
    #[must_use]
    pub fn sample(&self, n: usize, skip: Option<&Id52>) -> Vec<ConnHandle> {
        let mut rng = rand::thread_rng();
        self.bindings
            .iter()
            .filter(|e| skip != Some(e.key()))
            .map(|e| e.value().clone())
            .choose_multiple(&mut rng, n)
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no identity is currently bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
