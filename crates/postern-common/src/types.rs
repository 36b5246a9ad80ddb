//! Core type definitions and protocol constants for postern.

/// A 32-byte Ed25519 public key used as a device identity.
///
/// Named after its canonical string form: 52 characters of BASE32_DNSSEC
/// (see [`crate::id52`]). On the wire it is always the raw 32 bytes.
pub type Id52 = [u8; 32];

/// A secret 256-bit value whose hash is a commit. Presenting it authorizes
/// exactly one send to the identity that installed the matching commit.
pub type Preimage = [u8; 32];

/// One-way hash of a preimage, registered with the relay as an admission
/// token.
pub type Commit = [u8; 32];

/// Wire protocol version carried in HELLO.
/// Bump this on breaking wire-format changes.
pub const PROTOCOL_VERSION: u8 = 1;

/// Status codes carried in SEND_RESULT frames from relay to sender.
pub mod send_status {
    /// Recipient acknowledged; payload carries its response.
    pub const OK: u8 = 0;
    /// Recipient identity has no live bound connection.
    pub const OFFLINE: u8 = 1;
    /// The presented preimage matched no unconsumed commit.
    pub const INVALID_CAPABILITY: u8 = 2;
    /// Recipient was connected but did not acknowledge within the deadline.
    pub const TIMEOUT: u8 = 3;
    /// Recipient connection closed after delivery but before acknowledging.
    pub const DISCONNECTED: u8 = 4;
}

/// A signed, TTL-bounded claim by an identity of which relay currently
/// reaches it. The relay stores and forwards these verbatim; it never mints
/// or extends them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    /// Identity asserting its presence.
    pub id52: Id52,
    /// Relay identifier (host:port or similar) where the identity is reachable.
    pub relay: String,
    /// Unix timestamp (seconds) at which the assertion was issued.
    pub issued_at: u64,
    /// Lifetime of the assertion in seconds, counted from `issued_at`.
    pub ttl_secs: u32,
    /// Ed25519 signature by `id52` over the record fields.
    pub signature: [u8; 64],
}

impl PresenceRecord {
    /// Returns `true` if the record's TTL has elapsed at Unix time `now`.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.issued_at.saturating_add(u64::from(self.ttl_secs))
    }
}
