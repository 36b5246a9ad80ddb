//! Common types and utilities shared across the postern protocol stack.
//!
//! This crate provides:
//! - Binary frame serialization, parsing and the stream codec ([`frame`])
//! - Ed25519 and SHA-256 cryptographic helpers ([`crypto`])
//! - 52-character identity string encoding ([`id52`])
//! - Protocol type definitions and constants ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod frame;
pub mod id52;
pub mod types;

pub use types::{Commit, Id52, Preimage, PresenceRecord};
