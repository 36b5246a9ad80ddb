use crate::cache::ResponseCache;
use crate::metrics::counters;
use crate::server::ServerState;
use dashmap::DashMap;
use postern_common::frame::Frame;
use postern_common::{Id52, Preimage};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};

/// Terminal outcome of a SEND request. Exactly one is produced per request.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Recipient acknowledged; carries its response payload.
    Ok(Vec<u8>),
    /// Recipient identity has no live bound connection.
    Offline,
    /// The preimage matched no unconsumed commit for the recipient.
    InvalidCapability,
    /// Recipient did not acknowledge within the deadline.
    Timeout,
    /// Recipient connection closed after forwarding, before acknowledging.
    Disconnected,
}

impl SendOutcome {
    /// Wire status code for SEND_RESULT.
    #[must_use]
    pub fn status(&self) -> u8 {
        use postern_common::types::send_status;
        match self {
            Self::Ok(_) => send_status::OK,
            Self::Offline => send_status::OFFLINE,
            Self::InvalidCapability => send_status::INVALID_CAPABILITY,
            Self::Timeout => send_status::TIMEOUT,
            Self::Disconnected => send_status::DISCONNECTED,
        }
    }

    /// Response payload for SEND_RESULT; empty on every error outcome.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Ok(payload) => payload,
            _ => Vec::new(),
        }
    }

    /// Metrics label for this outcome.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::Offline => "offline",
            Self::InvalidCapability => "invalid_capability",
            Self::Timeout => "timeout",
            Self::Disconnected => "disconnected",
        }
    }
}

struct PendingEntry {
    preimage: Preimage,
    to_id52: Id52,
    /// Binding epoch of the recipient connection the DELIVER went to.
    bound_at: std::time::Instant,
    tx: oneshot::Sender<SendOutcome>,
}

/// Correlation table of in-flight deliveries awaiting acknowledgment.
///
/// Resolution is single-writer: whichever path removes an entry first
/// (matching ACK, recipient disconnect, deadline) owns it; later attempts
/// find nothing and are no-ops.
#[derive(Default)]
pub struct PendingSends {
    entries: DashMap<u32, PendingEntry>,
    next_correlation: AtomicU32,
}

impl PendingSends {
    /// Create an empty correlation table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_correlation: AtomicU32::new(1),
        }
    }

    /// Allocate a fresh correlation id and register a pending entry for it.
    fn register(
        &self,
        preimage: Preimage,
        to_id52: Id52,
        bound_at: std::time::Instant,
    ) -> (u32, oneshot::Receiver<SendOutcome>) {
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            correlation,
            PendingEntry {
                preimage,
                to_id52,
                bound_at,
                tx,
            },
        );
        (correlation, rx)
    }

    /// Remove an entry without resolving it (timeout or failed forward).
    /// Returns `true` if this call claimed the entry.
    fn abandon(&self, correlation: u32) -> bool {
        self.entries.remove(&correlation).is_some()
    }

    /// Resolve a pending entry with the recipient's acknowledgment.
    ///
    /// The entry is only claimed if `from_id52` matches the recipient the
    /// DELIVER went to — an ACK arriving on any other connection is
    /// ignored, as is a late or duplicate ACK. The response is mirrored
    /// into the cache under the original preimage before the waiting
    /// sender is woken, so a sender that disconnected mid-wait can still
    /// recover the result by retrying.
    pub fn resolve_ack(
        &self,
        correlation: u32,
        from_id52: &Id52,
        cache: &ResponseCache,
        response: Vec<u8>,
    ) -> bool {
        let Some((_, entry)) = self
            .entries
            .remove_if(&correlation, |_, e| e.to_id52 == *from_id52)
        else {
            return false;
        };
        cache.store(entry.preimage, response.clone());
        let _ = entry.tx.send(SendOutcome::Ok(response));
        true
    }

    /// Fail every pending entry whose DELIVER went to the given recipient
    /// binding. Called synchronously when that connection unbinds.
    pub fn fail_recipient(&self, id52: &Id52, bound_at: std::time::Instant) {
        let doomed: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| e.to_id52 == *id52 && e.bound_at == bound_at)
            .map(|e| *e.key())
            .collect();
        for correlation in doomed {
            if let Some((_, entry)) = self.entries.remove(&correlation) {
                let _ = entry.tx.send(SendOutcome::Disconnected);
            }
        }
    }

    /// Number of in-flight deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Service a SEND request end to end and return its terminal outcome.
///
/// Ordering is load-bearing: the cache short-circuit runs first (a retry
/// whose answer is known never contacts the recipient), the offline check
/// runs before capability consumption (no commit is spent on an offline
/// recipient), and consumption runs before any recipient-visible work (an
/// attacker without a valid capability cannot cause recipient-side
/// processing). A consumed capability is not refunded on later failure;
/// the timeout and disconnect paths are the resolution, not a rollback.
pub async fn route_send(
    state: &ServerState,
    to_id52: Id52,
    preimage: Preimage,
    payload: Vec<u8>,
) -> SendOutcome {
    if let Some(response) = state.cache.take(&preimage) {
        counters::cache_hits_total();
        return SendOutcome::Ok(response);
    }

    let Some(handle) = state.registry.get(&to_id52) else {
        return SendOutcome::Offline;
    };

    if !state.capabilities.try_consume(&to_id52, &preimage) {
        return SendOutcome::InvalidCapability;
    }

    let (correlation, mut rx) = state
        .pending
        .register(preimage, to_id52, handle.bound_at);

    let deadline = Instant::now() + Duration::from_secs(state.config.send_timeout);
    let deliver = Frame::deliver(correlation, &payload).serialize();

    // The recipient's write queue can be full; the forward shares the
    // delivery deadline rather than waiting unboundedly.
    match timeout_at(deadline, handle.tx.send(deliver)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            let _ = state.pending.abandon(correlation);
            return SendOutcome::Disconnected;
        }
        Err(_) => {
            let _ = state.pending.abandon(correlation);
            return SendOutcome::Timeout;
        }
    }

    match timeout_at(deadline, &mut rx).await {
        Ok(Ok(outcome)) => outcome,
        // Resolver dropped without sending; treated as recipient loss.
        Ok(Err(_)) => SendOutcome::Disconnected,
        Err(_) => {
            if state.pending.abandon(correlation) {
                SendOutcome::Timeout
            } else {
                // A resolver claimed the entry right at the deadline; its
                // outcome arrives immediately.
                rx.await.unwrap_or(SendOutcome::Disconnected)
            }
        }
    }
}
