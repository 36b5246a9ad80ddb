use clap::Parser;
use std::net::SocketAddr;

/// CLI arguments for the relay daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "posternd")]
#[command(about = "postern relay daemon")]
#[command(version)]
pub struct Args {
    /// Address the relay accepts connections on.
    #[arg(long, default_value = "0.0.0.0:7331", env = "POSTERND_LISTEN")]
    pub listen: SocketAddr,
    /// Address serving the Prometheus metrics and health endpoints.
    #[arg(long, default_value = "127.0.0.1:9090", env = "POSTERND_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Cap on concurrent connections across all peers.
    #[arg(long, default_value = "100000", env = "POSTERND_MAX_CONNS")]
    pub max_conns: usize,
    /// Cap on concurrent connections from a single IP address.
    #[arg(long, default_value = "10", env = "POSTERND_MAX_CONNS_IP")]
    pub max_conns_ip: usize,
    /// Largest SEND/ACK payload accepted, in bytes; advertised in HELLO.
    #[arg(long, default_value = "65536", env = "POSTERND_MAX_PAYLOAD")]
    pub max_payload: usize,
    /// Deadline in seconds for a recipient to acknowledge a delivery.
    #[arg(long, default_value = "30", env = "POSTERND_SEND_TIMEOUT")]
    pub send_timeout: u64,
    /// Response cache entry lifetime in seconds.
    #[arg(long, default_value = "300", env = "POSTERND_CACHE_TTL")]
    pub cache_ttl: u64,
    /// Seconds between relay keepalive frames.
    #[arg(long, default_value = "30", env = "POSTERND_KEEPALIVE_INTERVAL")]
    pub keepalive_interval: u64,
    /// Seconds of silence before a connection is dropped.
    #[arg(long, default_value = "120", env = "POSTERND_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
    /// Longest presence-assertion TTL the relay will store, in seconds.
    #[arg(long, default_value = "900", env = "POSTERND_PRESENCE_TTL_CAP")]
    pub presence_ttl_cap: u64,
    /// Seconds between presence gossip rounds.
    #[arg(long, default_value = "30", env = "POSTERND_GOSSIP_INTERVAL")]
    pub gossip_interval: u64,
    /// Presence records forwarded per gossip round.
    #[arg(long, default_value = "8", env = "POSTERND_GOSSIP_SAMPLE")]
    pub gossip_sample: usize,
    /// Connected peers contacted per gossip round.
    #[arg(long, default_value = "4", env = "POSTERND_GOSSIP_FANOUT")]
    pub gossip_fanout: usize,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the relay accepts connections on.
    pub listen: SocketAddr,
    /// Address serving the Prometheus metrics and health endpoints.
    pub metrics_addr: SocketAddr,
    /// Cap on concurrent connections across all peers.
    pub max_conns: usize,
    /// Cap on concurrent connections from a single IP address.
    pub max_conns_ip: usize,
    /// Largest SEND/ACK payload accepted, in bytes; advertised in HELLO.
    pub max_payload: usize,
    /// Deadline in seconds for a recipient to acknowledge a delivery.
    pub send_timeout: u64,
    /// Response cache entry lifetime in seconds.
    pub cache_ttl: u64,
    /// Seconds between relay keepalive frames.
    pub keepalive_interval: u64,
    /// Seconds of silence before a connection is dropped.
    pub idle_timeout: u64,
    /// Longest presence-assertion TTL the relay will store, in seconds.
    pub presence_ttl_cap: u64,
    /// Seconds between presence gossip rounds.
    pub gossip_interval: u64,
    /// Presence records forwarded per gossip round.
    pub gossip_sample: usize,
    /// Connected peers contacted per gossip round.
    pub gossip_fanout: usize,
}

fn bounded(name: &str, value: u64, low: u64, high: u64) -> Result<(), String> {
    if value < low || value > high {
        return Err(format!("{name} must be between {low} and {high}, got {value}"));
    }
    Ok(())
}

impl ServerConfig {
    /// Checks every knob against its acceptable range.
    pub fn validate(&self) -> Result<(), String> {
        // The frame codec buffers at most 1 MiB per frame; SEND adds a
        // fixed 68-byte header inside the frame payload.
        const PAYLOAD_CEILING: u64 = (postern_common::frame::MAX_FRAME_LEN - 68) as u64;

        bounded("max_conns", self.max_conns as u64, 1, 1_000_000)?;
        bounded("max_conns_ip", self.max_conns_ip as u64, 1, self.max_conns as u64)?;
        bounded("max_payload", self.max_payload as u64, 1, PAYLOAD_CEILING)?;
        bounded("send_timeout", self.send_timeout, 1, 300)?;
        bounded("cache_ttl", self.cache_ttl, 1, 3_600)?;
        bounded("keepalive_interval", self.keepalive_interval, 1, 3_600)?;
        bounded("idle_timeout", self.idle_timeout, 1, 86_400)?;
        bounded("presence_ttl_cap", self.presence_ttl_cap, 1, 86_400)?;
        bounded("gossip_interval", self.gossip_interval, 1, 3_600)?;
        bounded("gossip_sample", self.gossip_sample as u64, 1, 1_024)?;
        bounded("gossip_fanout", self.gossip_fanout as u64, 1, 64)?;
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            max_conns_ip: args.max_conns_ip,
            max_payload: args.max_payload,
            send_timeout: args.send_timeout,
            cache_ttl: args.cache_ttl,
            keepalive_interval: args.keepalive_interval,
            idle_timeout: args.idle_timeout,
            presence_ttl_cap: args.presence_ttl_cap,
            gossip_interval: args.gossip_interval,
            gossip_sample: args.gossip_sample,
            gossip_fanout: args.gossip_fanout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:7331".parse().unwrap(),
            metrics_addr: "127.0.0.1:9090".parse().unwrap(),
            max_conns: 1000,
            max_conns_ip: 10,
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

    fn rejection(tweak: impl FnOnce(&mut ServerConfig)) -> String {
        let mut c = base();
        tweak(&mut c);
        c.validate().unwrap_err()
    }

    #[test]
    fn defaults_pass() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn zero_values_rejected_by_name() {
        assert!(rejection(|c| c.max_conns = 0).contains("max_conns"));
        assert!(rejection(|c| c.max_conns_ip = 0).contains("max_conns_ip"));
        assert!(rejection(|c| c.max_payload = 0).contains("max_payload"));
        assert!(rejection(|c| c.send_timeout = 0).contains("send_timeout"));
        assert!(rejection(|c| c.cache_ttl = 0).contains("cache_ttl"));
        assert!(rejection(|c| c.gossip_fanout = 0).contains("gossip_fanout"));
    }

    #[test]
    fn per_ip_cap_cannot_exceed_global_cap() {
        let err = rejection(|c| c.max_conns_ip = c.max_conns + 1);
        assert!(err.contains("max_conns_ip"));
    }

    #[test]
    fn payload_cap_bounded_by_frame_limit() {
        let err = rejection(|c| c.max_payload = postern_common::frame::MAX_FRAME_LEN);
        assert!(err.contains("max_payload"));
    }

    #[test]
    fn oversized_timeouts_rejected() {
        assert!(rejection(|c| c.send_timeout = 301).contains("send_timeout"));
        assert!(rejection(|c| c.idle_timeout = 86_401).contains("idle_timeout"));
        assert!(rejection(|c| c.presence_ttl_cap = 86_401).contains("presence_ttl_cap"));
    }

    #[test]
    fn lower_boundary_passes() {
        let mut c = base();
        c.max_conns = 1;
        c.max_conns_ip = 1;
        c.max_payload = 1;
        c.send_timeout = 1;
        c.cache_ttl = 1;
        c.keepalive_interval = 1;
        c.idle_timeout = 1;
        c.presence_ttl_cap = 1;
        c.gossip_interval = 1;
        c.gossip_sample = 1;
        c.gossip_fanout = 1;
        assert!(c.validate().is_ok());
    }
}
