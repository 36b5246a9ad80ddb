use postern_common::frame::{CodecError, FrameError};
use thiserror::Error;

/// Errors that can occur during relay operation.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Binary frame encoding or decoding error; fatal to the connection.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    /// Transport-level codec failure (I/O or framing).
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The claimed identity is not a valid Ed25519 public key.
    #[error("invalid identity key: {0}")]
    InvalidIdentityKey(#[from] ed25519_dalek::SignatureError),
    /// The identity-claim signature did not verify against the nonce.
    #[error("identity proof verification failed")]
    InvalidIdentityProof,
    /// A SEND or ACK payload exceeds the negotiated maximum.
    #[error("payload of {actual} bytes exceeds negotiated maximum of {max}")]
    PayloadTooLarge {
        /// Negotiated maximum payload size.
        max: usize,
        /// Actual payload size received.
        actual: usize,
    },
    /// The connection was closed by the remote peer or displaced.
    #[error("connection closed")]
    ConnectionClosed,
}
