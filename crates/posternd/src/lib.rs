//! postern relay daemon — untrusted, stateless message relay for
//! identity-addressed devices.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Preimage-keyed cache of recent responses for idempotent retry.
pub mod cache;
/// One-time capability commits and atomic consumption.
pub mod capability;
/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for relay operations.
pub mod error;
/// Prometheus metrics collection and ops HTTP endpoint.
pub mod metrics;
/// Send orchestration: delivery, acknowledgment and terminal outcomes.
pub mod orchestrator;
/// Signed presence assertions and gossip.
pub mod presence;
/// id52-based binding table for connected devices.
pub mod registry;
/// Accept loop and shared server state.
pub mod server;

pub use server::{run, run_with_shutdown, ServerState};
