use crate::cache::ResponseCache;
use crate::capability::CapabilityStore;
use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::RelayError;
use crate::metrics::gauges;
use crate::orchestrator::PendingSends;
use crate::presence::PresenceStore;
use crate::registry::Registry;
use dashmap::DashMap;
use postern_common::crypto;
use postern_common::frame::Frame;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Interval between cache sweeps and presence prunes.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for the relay daemon.
pub struct ServerState {
    /// Runtime configuration.
    pub config: ServerConfig,
    /// id52 → live connection bindings.
    pub registry: Registry,
    /// Per-identity one-time capability commits.
    pub capabilities: CapabilityStore,
    /// Preimage-keyed cache of recent acknowledgment payloads.
    pub cache: ResponseCache,
    /// Correlation table of deliveries awaiting acknowledgment.
    pub pending: PendingSends,
    /// Gossiped presence assertions.
    pub presence: PresenceStore,
    /// Per-IP connection counter for enforcing connection limits.
    pub ip_connections: DashMap<IpAddr, usize>,
    /// Atomic counter for active connections (TOCTOU-safe).
    pub active_connections: AtomicUsize,
}

impl ServerState {
    /// Build the full service state from a validated configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let cache = ResponseCache::new(Duration::from_secs(config.cache_ttl));
        let presence = PresenceStore::new(config.presence_ttl_cap);
        Self {
            config,
            registry: Registry::new(),
            capabilities: CapabilityStore::new(),
            cache,
            pending: PendingSends::new(),
            presence,
            ip_connections: DashMap::new(),
            active_connections: AtomicUsize::new(0),
        }
    }
}

/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), RelayError> {
    let (shutdown_tx, _) = tokio::sync::watch::channel(());
    run_with_shutdown(listener, state, shutdown_tx).await
}

/// Run the accept loop with an externally-controlled shutdown signal.
///
/// When the `shutdown_tx` sender is dropped, the accept loop stops
/// accepting new connections and waits for in-flight connections to
/// finish.
///
/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown_tx: tokio::sync::watch::Sender<()>,
) -> Result<(), RelayError> {
    let local_addr = listener.local_addr().map_err(RelayError::Io)?;
    info!("relay listening on {}", local_addr);
    let mut shutdown_rx = shutdown_tx.subscribe();
    let maintenance = tokio::spawn(run_maintenance(
        Arc::clone(&state),
        shutdown_tx.subscribe(),
    ));
    let task_tracker = Arc::new(tokio::sync::Notify::new());
    let mut active_tasks: usize = 0;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if state.active_connections.load(Ordering::Relaxed) >= state.config.max_conns {
                            warn!("connection cap reached, dropping {}", addr);
                            drop(stream);
                            continue;
                        }
                        let state = Arc::clone(&state);
                        let tracker = task_tracker.clone();
                        active_tasks += 1;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                debug!("connection from {} closed: {}", addr, e);
                            }
                            tracker.notify_one();
                        });
                    }
                    Err(e) => {
                        error!("accept failed: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("shutting down, draining {} connections", active_tasks);
                break;
            }
        }
    }

    // Give in-flight connections a bounded window to finish.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while active_tasks > 0 {
        if tokio::time::timeout_at(deadline, task_tracker.notified())
            .await
            .is_err()
        {
            warn!("drain deadline hit, {} connections abandoned", active_tasks);
            break;
        }
        active_tasks = active_tasks.saturating_sub(1);
    }

    maintenance.abort();
    info!("relay shut down gracefully");
    Ok(())
}

/// Background maintenance: cache sweep, presence prune, presence gossip
/// and live-state gauge refresh.
async fn run_maintenance(
    state: Arc<ServerState>,
    mut shutdown_rx: tokio::sync::watch::Receiver<()>,
) {
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    let mut gossip = tokio::time::interval(Duration::from_secs(state.config.gossip_interval));
    // The first interval tick fires immediately; skip it so a fresh server
    // does not gossip an empty store.
    sweep.tick().await;
    gossip.tick().await;

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                state.cache.sweep();
                state.presence.prune(crypto::unix_now());
                gauges::identities_bound(state.registry.len());
                gauges::sends_in_flight(state.pending.len());
            }
            _ = gossip.tick() => {
                gossip_round(&state);
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

/// One bounded gossip round: a random sample of live presence records is
/// forwarded to a random sample of connected peers. Best effort; a peer
/// with a full write queue is skipped rather than waited on.
fn gossip_round(state: &ServerState) {
    let now = crypto::unix_now();
    let records = state.presence.sample(state.config.gossip_sample, now);
    if records.is_empty() {
        return;
    }
    let peers = state.registry.sample(state.config.gossip_fanout, None);
    for peer in peers {
        for record in &records {
            // A peer does not need its own assertion back.
            if record.id52 == peer.id52 {
                continue;
            }
            let bytes = Frame::presence(record.clone()).serialize();
            if peer.tx.try_send(bytes).is_err() {
                break;
            }
        }
    }
}
