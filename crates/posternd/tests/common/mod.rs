#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use futures_util::{SinkExt, StreamExt};
use postern_common::frame::{Frame, FrameCodec, RecentResponse, MAX_FRAME_LEN};
use postern_common::{crypto, Commit, Id52, Preimage, PresenceRecord};
use posternd::config::ServerConfig;
use posternd::server::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        max_conns_ip: 100,
        max_payload: 65_536,
        send_timeout: 30,
        cache_ttl: 300,
        keepalive_interval: 30,
        idle_timeout: 120,
        presence_ttl_cap: 900,
        gossip_interval: 30,
        gossip_sample: 8,
        gossip_fanout: 4,
    }
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    start_with(listener, test_config(addr)).await
}

pub async fn start_server_with(
    tweak: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    tweak(&mut config);
    start_with(listener, config).await
}

async fn start_with(
    listener: TcpListener,
    config: ServerConfig,
) -> (SocketAddr, Arc<ServerState>) {
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(config));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = posternd::run(listener, state_clone).await {
            eprintln!("relay error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

pub struct TestClient {
    pub frames: Framed<TcpStream, FrameCodec>,
    pub keypair: SigningKey,
    pub id52: Id52,
    /// Nonce from the relay's HELLO, signed during registration.
    pub nonce: u32,
    /// Payload ceiling advertised in HELLO.
    pub max_payload: u32,
}

impl TestClient {
    /// Connect and consume the relay's HELLO. Does not register.
    pub async fn connect(addr: &SocketAddr, keypair: SigningKey) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut frames = Framed::new(stream, FrameCodec::new(MAX_FRAME_LEN));

        let hello = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("timeout waiting for HELLO")
            .unwrap()
            .unwrap();
        let Frame::Hello {
            nonce, max_payload, ..
        } = hello
        else {
            panic!("expected Hello, got {hello:?}");
        };

        let id52 = keypair.verifying_key().to_bytes();
        Self {
            frames,
            keypair,
            id52,
            nonce,
            max_payload,
        }
    }

    /// Connect, then bind our identity with the given commits.
    pub async fn register(addr: &SocketAddr, keypair: SigningKey, commits: &[Commit]) -> Self {
        let mut client = Self::connect(addr, keypair).await;
        client.send_i_am(commits, &[]).await;
        client
    }

    pub async fn send_i_am(&mut self, commits: &[Commit], recent: &[RecentResponse]) {
        let signature = crypto::sign_binding(&self.keypair, self.nonce, &self.id52);
        let i_am = Frame::IAm {
            id52: self.id52,
            signature,
            commits: commits.to_vec(),
            recent_responses: recent.to_vec(),
        };
        self.frames.send(i_am).await.unwrap();
    }

    pub async fn send_to(&mut self, to: &Id52, preimage: &Preimage, payload: &[u8]) {
        let frame = Frame::send(to, preimage, payload);
        self.frames.send(frame).await.unwrap();
    }

    pub async fn send_ack(&mut self, correlation: u32, payload: &[u8]) {
        self.frames.send(Frame::ack(correlation, payload)).await.unwrap();
    }

    pub async fn send_presence(&mut self, record: PresenceRecord) {
        self.frames.send(Frame::presence(record)).await.unwrap();
    }

    /// Next frame that is not a relay keepalive.
    pub async fn recv_frame(&mut self) -> Frame {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.frames.next())
                .await
                .expect("timeout waiting for frame")
                .expect("connection closed")
                .unwrap();
            if !matches!(frame, Frame::Keepalive) {
                return frame;
            }
        }
    }

    pub async fn recv_frame_timeout(&mut self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.recv_frame()).await.ok()
    }

    /// Next DELIVER, skipping keepalives and gossip.
    pub async fn recv_deliver(&mut self) -> (u32, Vec<u8>) {
        loop {
            match self.recv_frame().await {
                Frame::Deliver {
                    correlation,
                    payload,
                } => return (correlation, payload),
                Frame::Presence(_) => continue,
                other => panic!("expected Deliver, got {other:?}"),
            }
        }
    }

    /// Next SEND_RESULT, skipping keepalives and gossip.
    pub async fn recv_send_result(&mut self) -> (u8, Vec<u8>) {
        loop {
            match self.recv_frame().await {
                Frame::SendResult { status, payload } => return (status, payload),
                Frame::Presence(_) => continue,
                other => panic!("expected SendResult, got {other:?}"),
            }
        }
    }
}

/// A fresh keypair plus one preimage/commit pair for it.
pub fn fresh_capability() -> (Preimage, Commit) {
    use rand::RngCore;
    let mut preimage = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut preimage);
    (preimage, crypto::commit_of(&preimage))
}

pub fn fresh_keypair() -> SigningKey {
    SigningKey::generate(&mut rand::rngs::OsRng)
}

pub fn signed_presence(keypair: &SigningKey, relay: &str, issued_at: u64, ttl_secs: u32) -> PresenceRecord {
    let id52 = keypair.verifying_key().to_bytes();
    let signature = crypto::sign_presence(keypair, &id52, relay, issued_at, ttl_secs);
    PresenceRecord {
        id52,
        relay: relay.to_string(),
        issued_at,
        ttl_secs,
        signature,
    }
}
