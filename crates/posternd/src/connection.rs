use crate::error::RelayError;
use crate::metrics::{counters, gauges, histograms};
use crate::orchestrator;
use crate::presence::PresenceReject;
use crate::registry::ConnHandle;
use crate::server::ServerState;
use ed25519_dalek::VerifyingKey;
use futures_util::StreamExt;
use postern_common::frame::{Frame, FrameCodec, MAX_FRAME_LEN};
use postern_common::{crypto, Id52};
use rand::rngs::OsRng;
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

/// Outbound queue depth per connection. DELIVER forwards await a slot
/// under the delivery deadline, so a full queue costs the sender at most
/// its send timeout; gossip uses `try_send` and skips a full queue.
const WRITE_QUEUE_DEPTH: usize = 256;

/// Upper bound on re-uploaded responses accepted at registration. Anything
/// past this is dropped rather than letting one client flood the cache.
const MAX_RECENT_RESPONSES: usize = 64;

struct IpGuard {
    state: Arc<ServerState>,
    ip: IpAddr,
}

impl Drop for IpGuard {
    fn drop(&mut self) {
        let mut remove = false;
        if let Some(mut entry) = self.state.ip_connections.get_mut(&self.ip) {
            *entry = entry.saturating_sub(1);
            if *entry == 0 {
                remove = true;
            }
        }
        if remove {
            self.state
                .ip_connections
                .remove_if(&self.ip, |_, v| *v == 0);
        }
    }
}

/// The identity a connection has proven via I_AM.
struct Binding {
    id52: Id52,
    bound_at: Instant,
}

/// Per-connection state threaded through the frame dispatcher.
struct Conn {
    state: Arc<ServerState>,
    /// Queue drained by this connection's writer; cloned into the registry
    /// handle on bind so other connections can reach us.
    out_tx: mpsc::Sender<Vec<u8>>,
    /// Cancelled when a newer binding for our identity displaces us.
    cancel: CancellationToken,
    /// Nonce issued in our HELLO, signed by the client in I_AM.
    nonce: u32,
    binding: Option<Binding>,
}

pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), RelayError> {
    let client_ip = peer_addr.ip();

    // Atomic check-and-increment via the entry API so two racing accepts
    // cannot both squeeze under the per-IP limit.
    let mut should_reject = false;
    match state.ip_connections.entry(client_ip) {
        dashmap::mapref::entry::Entry::Occupied(mut entry) => {
            let count = *entry.get();
            if count >= state.config.max_conns_ip {
                should_reject = true;
            } else {
                *entry.get_mut() += 1;
            }
        }
        dashmap::mapref::entry::Entry::Vacant(entry) => {
            entry.insert(1);
        }
    }
    if should_reject {
        tracing::debug!(ip = %client_ip, limit = state.config.max_conns_ip, "per-IP connection limit exceeded");
        return Err(RelayError::ConnectionClosed);
    }
    let _ip_guard = IpGuard {
        state: state.clone(),
        ip: client_ip,
    };

    state.active_connections.fetch_add(1, Ordering::Relaxed);
    gauges::inc_connections_active();

    let result = serve_connection(stream, &state).await;

    state.active_connections.fetch_sub(1, Ordering::Relaxed);
    gauges::dec_connections_active();
    result
}

async fn serve_connection(stream: TcpStream, state: &Arc<ServerState>) -> Result<(), RelayError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, FrameCodec::new(MAX_FRAME_LEN));

    // The relay speaks first: version, a nonce for the identity proof, and
    // the payload ceiling the client must respect.
    let nonce: u32 = OsRng.gen();
    let hello = Frame::hello(nonce, state.config.max_payload as u32);
    write_half.write_all(&hello.serialize()).await?;

    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_DEPTH);
    let mut conn = Conn {
        state: Arc::clone(state),
        out_tx,
        cancel: CancellationToken::new(),
        nonce,
        binding: None,
    };

    let result = run_frame_loop(&mut frames, &mut write_half, &mut out_rx, &mut conn).await;

    // Tear down whatever we bound, and resolve every delivery that was
    // waiting on this connection. Epoch-guarded so a binding that already
    // moved to a newer connection is left alone.
    if let Some(binding) = conn.binding.take() {
        conn.state.registry.unbind_if(&binding.id52, binding.bound_at);
        conn.state
            .pending
            .fail_recipient(&binding.id52, binding.bound_at);
    }

    result
}

async fn run_frame_loop(
    frames: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, FrameCodec>,
    write_half: &mut OwnedWriteHalf,
    out_rx: &mut mpsc::Receiver<Vec<u8>>,
    conn: &mut Conn,
) -> Result<(), RelayError> {
    let mut keepalive = interval(Duration::from_secs(conn.state.config.keepalive_interval));
    keepalive.tick().await;
    let idle_timeout = Duration::from_secs(conn.state.config.idle_timeout);
    let mut last_activity = Instant::now();
    let cancel = conn.cancel.clone();

    loop {
        tokio::select! {
            frame = frames.next() => {
                last_activity = Instant::now();
                match frame {
                    Some(Ok(frame)) => process_frame(frame, conn).await?,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                }
            }
            Some(bytes) = out_rx.recv() => {
                counters::payload_bytes_total("out", bytes.len() as u64);
                write_half.write_all(&bytes).await?;
            }
            _ = keepalive.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!("idle timeout reached, closing connection");
                    return Ok(());
                }
                write_half.write_all(&Frame::keepalive().serialize()).await?;
            }
            _ = cancel.cancelled() => {
                tracing::debug!("binding displaced by newer connection, closing");
                return Ok(());
            }
        }
    }
}

async fn process_frame(frame: Frame, conn: &mut Conn) -> Result<(), RelayError> {
    match frame {
        Frame::IAm {
            id52,
            signature,
            commits,
            recent_responses,
        } => handle_i_am(conn, id52, &signature, commits, recent_responses),
        Frame::Send {
            to_id52,
            preimage,
            payload,
        } => handle_send(conn, to_id52, preimage, payload),
        Frame::Ack {
            correlation,
            payload,
        } => handle_ack(conn, correlation, payload),
        Frame::Presence(record) => {
            handle_presence(conn, record);
            Ok(())
        }
        Frame::Keepalive => Ok(()),
        other => {
            // HELLO, DELIVER and SEND_RESULT only ever flow relay → client.
            counters::frames_dropped_total("unexpected_type");
            tracing::debug!(
                frame_type = other.frame_type(),
                "ignoring frame type not valid from a client"
            );
            Ok(())
        }
    }
}

/// Verify an identity claim and bind this connection to it.
///
/// The proof is a signature over our HELLO nonce and the claimed id52, so
/// a capture from another session cannot be replayed here. A successful
/// bind replaces the identity's commit set wholesale and seeds the
/// response cache with any responses the client produced while no relay
/// held them.
fn handle_i_am(
    conn: &mut Conn,
    id52: Id52,
    signature: &[u8; 64],
    commits: Vec<postern_common::Commit>,
    recent_responses: Vec<postern_common::frame::RecentResponse>,
) -> Result<(), RelayError> {
    let verifying_key = VerifyingKey::from_bytes(&id52)?;
    if !crypto::verify_binding(&verifying_key, conn.nonce, &id52, signature) {
        counters::binds_total("rejected");
        return Err(RelayError::InvalidIdentityProof);
    }

    // A re-bind on the same connection retires the previous epoch first,
    // so the displacement below can only ever hit another connection.
    if let Some(prev) = conn.binding.take() {
        conn.state.registry.unbind_if(&prev.id52, prev.bound_at);
        conn.state.pending.fail_recipient(&prev.id52, prev.bound_at);
    }

    conn.state.capabilities.install(id52, commits);
    for recent in recent_responses.into_iter().take(MAX_RECENT_RESPONSES) {
        conn.state.cache.store(recent.preimage, recent.response);
    }

    let bound_at = Instant::now();
    let handle = ConnHandle {
        tx: conn.out_tx.clone(),
        id52,
        bound_at,
        cancel: conn.cancel.clone(),
    };
    if let Some(displaced) = conn.state.registry.bind(id52, handle) {
        counters::binds_total("displaced");
        displaced.cancel.cancel();
        conn.state
            .pending
            .fail_recipient(&id52, displaced.bound_at);
    } else {
        counters::binds_total("bound");
    }
    conn.binding = Some(Binding { id52, bound_at });

    tracing::info!(id52 = %postern_common::id52::encode(&id52), "identity bound");
    Ok(())
}

/// Service a SEND on its own task so a slow recipient never blocks this
/// connection's read loop; the terminal SEND_RESULT comes back through the
/// sender's write queue. No binding is required to send: the capability
/// preimage is the authorization and the relay learns nothing about who
/// is asking.
fn handle_send(
    conn: &Conn,
    to_id52: Id52,
    preimage: postern_common::Preimage,
    payload: Vec<u8>,
) -> Result<(), RelayError> {
    if payload.len() > conn.state.config.max_payload {
        return Err(RelayError::PayloadTooLarge {
            max: conn.state.config.max_payload,
            actual: payload.len(),
        });
    }
    counters::payload_bytes_total("in", payload.len() as u64);

    let state = Arc::clone(&conn.state);
    let reply_tx = conn.out_tx.clone();
    tokio::spawn(async move {
        let start = Instant::now();
        let outcome = orchestrator::route_send(&state, to_id52, preimage, payload).await;
        counters::sends_total(outcome.label());
        histograms::send_latency_seconds(start.elapsed().as_secs_f64());

        let status = outcome.status();
        let result = Frame::send_result(status, outcome.into_payload());
        // Sender gone is fine: an OK outcome is already in the cache and a
        // retry will recover it.
        let _ = reply_tx.send(result.serialize()).await;
    });
    Ok(())
}

/// Resolve a pending delivery with the recipient's response. Only the
/// connection the DELIVER went out on may acknowledge it.
fn handle_ack(conn: &Conn, correlation: u32, payload: Vec<u8>) -> Result<(), RelayError> {
    if payload.len() > conn.state.config.max_payload {
        return Err(RelayError::PayloadTooLarge {
            max: conn.state.config.max_payload,
            actual: payload.len(),
        });
    }
    let Some(binding) = conn.binding.as_ref() else {
        counters::frames_dropped_total("ack_unbound");
        return Ok(());
    };
    if !conn
        .state
        .pending
        .resolve_ack(correlation, &binding.id52, &conn.state.cache, payload)
    {
        // Late, duplicate, or not addressed to this identity.
        counters::frames_dropped_total("ack_unmatched");
    }
    Ok(())
}

fn handle_presence(conn: &Conn, record: postern_common::PresenceRecord) {
    match conn.state.presence.observe(record, crypto::unix_now()) {
        Ok(()) => counters::presence_observed_total("accepted"),
        Err(PresenceReject::Stale) => counters::presence_observed_total("stale"),
        Err(PresenceReject::Expired) => counters::presence_observed_total("expired"),
        Err(PresenceReject::TtlTooLong) => counters::presence_observed_total("ttl_too_long"),
        Err(PresenceReject::FutureDated) => counters::presence_observed_total("future_dated"),
        Err(PresenceReject::BadSignature | PresenceReject::BadKey) => {
            counters::presence_observed_total("bad_signature");
        }
    }
}
