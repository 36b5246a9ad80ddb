//! Canonical string encoding for identities.
//!
//! A 32-byte public key encodes to exactly 52 characters of BASE32_DNSSEC,
//! which is where the name "id52" comes from. The string form appears in
//! logs, CLI arguments and invites; the wire always carries raw bytes.

use crate::types::Id52;
use data_encoding::BASE32_DNSSEC;
use thiserror::Error;

/// Errors that can occur when decoding an id52 string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Id52DecodeError {
    /// The input is not valid BASE32_DNSSEC.
    #[error("invalid base32: {0}")]
    Base32(String),
    /// The decoded bytes are not exactly 32 bytes.
    #[error("identity must decode to exactly 32 bytes, got {0}")]
    WrongLength(usize),
}

/// Encodes an identity to its 52-character string form.
///
/// # Examples
///
/// ```
/// let s = postern_common::id52::encode(&[0u8; 32]);
/// assert_eq!(s.len(), 52);
/// ```
#[must_use]
pub fn encode(id52: &Id52) -> String {
    BASE32_DNSSEC.encode(id52)
}

/// Decodes a 52-character identity string back to raw bytes.
///
/// # Errors
///
/// Returns [`Id52DecodeError`] if the input is not valid BASE32_DNSSEC or
/// does not decode to exactly 32 bytes.
pub fn decode(s: &str) -> Result<Id52, Id52DecodeError> {
    let bytes = BASE32_DNSSEC
        .decode(s.as_bytes())
        .map_err(|e| Id52DecodeError::Base32(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Id52DecodeError::WrongLength(len))
}
