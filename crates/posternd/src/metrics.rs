use axum::extract::State;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Readiness flag shared between the accept loop and the ops endpoints.
/// Flipped off during shutdown drain so load balancers stop routing here.
#[derive(Clone)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
    started_at: Instant,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a health state that reports ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
            started_at: Instant::now(),
        }
    }

    /// Mark the service ready or not ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct ReadyBody {
    ready: bool,
}

/// Serve `/metrics`, `/health` and `/ready` on the given address.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder is already installed or if
/// binding the HTTP listener fails.
pub async fn serve_ops(addr: SocketAddr, health: HealthState) -> anyhow::Result<()> {
    let recorder = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let r = recorder.clone();
                async move { r.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(health);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ops endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(State(health): State<HealthState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy",
        uptime_secs: health.started_at.elapsed().as_secs(),
    })
}

async fn ready_handler(State(health): State<HealthState>) -> (StatusCode, Json<ReadyBody>) {
    if health.is_ready() {
        (StatusCode::OK, Json(ReadyBody { ready: true }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody { ready: false }),
        )
    }
}

/// Live-state gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("postern_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("postern_connections_active").decrement(1.0);
    }

    /// Set the bound-identities gauge to the current registry size.
    pub fn identities_bound(count: usize) {
        metrics::gauge!("postern_identities_bound").set(count as f64);
    }

    /// Set the in-flight deliveries gauge.
    pub fn sends_in_flight(count: usize) {
        metrics::gauge!("postern_sends_in_flight").set(count as f64);
    }
}

/// Event counters.
pub mod counters {
    /// Record a completed SEND with its terminal status label.
    pub fn sends_total(status: &'static str) {
        metrics::counter!("postern_sends_total", "status" => status).increment(1);
    }

    /// Increment the cache-hit counter (a retry answered from the cache).
    pub fn cache_hits_total() {
        metrics::counter!("postern_cache_hits_total").increment(1);
    }

    /// Record an identity bind attempt with the given status label.
    pub fn binds_total(status: &'static str) {
        metrics::counter!("postern_binds_total", "status" => status).increment(1);
    }

    /// Record a presence record observation with the given status label.
    pub fn presence_observed_total(status: &'static str) {
        metrics::counter!("postern_presence_observed_total", "status" => status).increment(1);
    }

    /// Increment the dropped-frames counter with the given reason label.
    pub fn frames_dropped_total(reason: &'static str) {
        metrics::counter!("postern_frames_dropped_total", "reason" => reason).increment(1);
    }

    /// Record payload bytes relayed in the given direction.
    pub fn payload_bytes_total(direction: &'static str, bytes: u64) {
        metrics::counter!("postern_payload_bytes_total", "direction" => direction).increment(bytes);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record an end-to-end SEND resolution latency in seconds.
    pub fn send_latency_seconds(value: f64) {
        metrics::histogram!("postern_send_latency_seconds").record(value);
    }
}
