//! Postern binary frame serialization and parsing.
//!
//! Each frame is `{u16 type BE, u32 length BE, bytes[length]}` sent over a
//! TCP stream. [`FrameCodec`] turns the raw byte stream into a lazy sequence
//! of typed [`Frame`]s; any malformed frame is fatal to the connection.

use crate::types::{Commit, Id52, Preimage, PresenceRecord};
use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// HELLO frame type: relay → client, sent once per connection.
pub const TYPE_HELLO: u16 = 0x0001;
/// I_AM frame type: client → relay, identity claim with commit set.
pub const TYPE_I_AM: u16 = 0x0002;
/// SEND frame type: client → relay, requests synchronous delivery.
pub const TYPE_SEND: u16 = 0x0003;
/// DELIVER frame type: relay → client, forwards a payload to the recipient.
pub const TYPE_DELIVER: u16 = 0x0004;
/// ACK frame type: client → relay, recipient's response to a DELIVER.
pub const TYPE_ACK: u16 = 0x0005;
/// KEEPALIVE frame type: either direction, empty payload.
pub const TYPE_KEEPALIVE: u16 = 0x0006;
/// SEND_RESULT frame type: relay → client, terminal outcome of a SEND.
pub const TYPE_SEND_RESULT: u16 = 0x0007;
/// PRESENCE frame type: either direction, signed presence assertion.
pub const TYPE_PRESENCE: u16 = 0x0008;

/// Frame header: u16 type + u32 payload length, both big-endian.
pub const HEADER_LEN: usize = 6;

/// Upper bound on a declared frame payload length (1 MiB). Anything larger
/// is rejected before buffering.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// A response the recipient recently produced, re-uploaded at I_AM so a
/// sender retrying against this relay hits the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentResponse {
    /// Preimage the original SEND presented.
    pub preimage: Preimage,
    /// The acknowledgment payload the recipient produced.
    pub response: Vec<u8>,
}

/// A parsed postern protocol frame.
///
/// Variants map 1:1 to wire frame types defined by `TYPE_*` constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Relay greeting carrying the per-connection nonce.
    Hello {
        /// Protocol version.
        version: u8,
        /// Random per-connection nonce, signed back in I_AM.
        nonce: u32,
        /// Maximum SEND/ACK payload size this relay accepts.
        max_payload: u32,
    },
    /// Identity claim: binds this connection to `id52` on success.
    IAm {
        /// Claimed identity (Ed25519 public key).
        id52: Id52,
        /// Ed25519 signature over `nonce_be ‖ id52`.
        signature: [u8; 64],
        /// Admission tokens to install, replacing any prior set.
        commits: Vec<Commit>,
        /// Recently produced responses for cache re-upload.
        recent_responses: Vec<RecentResponse>,
    },
    /// Request to deliver `payload` to `to_id52`, spending `preimage`.
    Send {
        /// Recipient identity.
        to_id52: Id52,
        /// One-time capability preimage.
        preimage: Preimage,
        /// Opaque encrypted payload.
        payload: Vec<u8>,
    },
    /// Relay-to-recipient forwarded payload.
    Deliver {
        /// Correlation id linking the eventual ACK back to the sender.
        correlation: u32,
        /// Opaque encrypted payload.
        payload: Vec<u8>,
    },
    /// Recipient's acknowledgment of a DELIVER.
    Ack {
        /// Correlation id from the DELIVER being acknowledged.
        correlation: u32,
        /// Opaque encrypted response for the sender.
        payload: Vec<u8>,
    },
    /// Liveness probe, empty payload.
    Keepalive,
    /// Terminal outcome of a SEND.
    SendResult {
        /// One of [`crate::types::send_status`].
        status: u8,
        /// Recipient's response on success, empty otherwise.
        payload: Vec<u8>,
    },
    /// Signed presence assertion, stored and gossiped verbatim.
    Presence(PresenceRecord),
}

/// Errors that can occur during frame parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The payload is too short for the declared frame type.
    #[error("frame too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },
    /// The declared frame length exceeds the codec bound.
    #[error("frame too large: max {max}, got {actual}")]
    FrameTooLarge {
        /// Maximum allowed payload length.
        max: usize,
        /// Declared payload length.
        actual: usize,
    },
    /// An inner length field points past the end of the payload.
    #[error("inner length field truncated")]
    Truncated,
    /// The frame type matches no known message.
    #[error("unknown frame type 0x{0:04x}")]
    UnknownType(u16),
    /// A presence relay identifier was not valid UTF-8.
    #[error("relay identifier is not valid utf-8")]
    InvalidUtf8,
}

/// Errors produced by [`FrameCodec`] when driving a transport.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Frame parsing error; fatal to the connection.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Safely convert a byte slice to a fixed-size array.
/// Returns `FrameError::TooShort` if the slice is the wrong length.
fn try_into_array<const N: usize>(data: &[u8]) -> Result<[u8; N], FrameError> {
    data.try_into().map_err(|_| FrameError::TooShort {
        expected: N,
        actual: data.len(),
    })
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, FrameError> {
    let bytes = data.get(at..at + 2).ok_or(FrameError::Truncated)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, FrameError> {
    let bytes = data.get(at..at + 4).ok_or(FrameError::Truncated)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], at: usize) -> Result<u64, FrameError> {
    let bytes = data.get(at..at + 8).ok_or(FrameError::Truncated)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(arr))
}

impl Frame {
    /// Creates a `Hello` frame at the current protocol version.
    #[must_use]
    pub const fn hello(nonce: u32, max_payload: u32) -> Self {
        Self::Hello {
            version: crate::types::PROTOCOL_VERSION,
            nonce,
            max_payload,
        }
    }

    /// Creates an `IAm` frame with no re-uploaded responses.
    #[must_use]
    pub fn i_am(id52: &Id52, signature: &[u8; 64], commits: Vec<Commit>) -> Self {
        Self::IAm {
            id52: *id52,
            signature: *signature,
            commits,
            recent_responses: Vec::new(),
        }
    }

    /// Creates a `Send` frame targeting the given recipient.
    #[must_use]
    pub fn send(to_id52: &Id52, preimage: &Preimage, payload: &[u8]) -> Self {
        Self::Send {
            to_id52: *to_id52,
            preimage: *preimage,
            payload: payload.to_vec(),
        }
    }

    /// Creates a `Deliver` frame for the given correlation id.
    #[must_use]
    pub fn deliver(correlation: u32, payload: &[u8]) -> Self {
        Self::Deliver {
            correlation,
            payload: payload.to_vec(),
        }
    }

    /// Creates an `Ack` frame for the given correlation id.
    #[must_use]
    pub fn ack(correlation: u32, payload: &[u8]) -> Self {
        Self::Ack {
            correlation,
            payload: payload.to_vec(),
        }
    }

    /// Creates a `Keepalive` frame.
    #[must_use]
    pub const fn keepalive() -> Self {
        Self::Keepalive
    }

    /// Creates a `SendResult` frame with the given status and payload.
    #[must_use]
    pub fn send_result(status: u8, payload: Vec<u8>) -> Self {
        Self::SendResult { status, payload }
    }

    /// Creates a `Presence` frame from a signed record.
    #[must_use]
    pub const fn presence(record: PresenceRecord) -> Self {
        Self::Presence(record)
    }

    /// Returns the wire type for this frame.
    #[must_use]
    pub const fn frame_type(&self) -> u16 {
        match self {
            Self::Hello { .. } => TYPE_HELLO,
            Self::IAm { .. } => TYPE_I_AM,
            Self::Send { .. } => TYPE_SEND,
            Self::Deliver { .. } => TYPE_DELIVER,
            Self::Ack { .. } => TYPE_ACK,
            Self::Keepalive => TYPE_KEEPALIVE,
            Self::SendResult { .. } => TYPE_SEND_RESULT,
            Self::Presence(_) => TYPE_PRESENCE,
        }
    }

    /// Serializes the frame payload (everything after the 6-byte header).
    #[must_use]
    pub fn payload_bytes(&self) -> Vec<u8> {
        match self {
            Self::Hello {
                version,
                nonce,
                max_payload,
            } => {
                let mut v = Vec::with_capacity(9);
                v.push(*version);
                v.extend_from_slice(&nonce.to_be_bytes());
                v.extend_from_slice(&max_payload.to_be_bytes());
                v
            }
            Self::IAm {
                id52,
                signature,
                commits,
                recent_responses,
            } => {
                let mut cap = 32 + 64 + 2 + commits.len() * 32 + 2;
                for r in recent_responses {
                    cap += 36 + r.response.len();
                }
                let mut v = Vec::with_capacity(cap);
                v.extend_from_slice(id52);
                v.extend_from_slice(signature);
                v.extend_from_slice(&(commits.len() as u16).to_be_bytes());
                for commit in commits {
                    v.extend_from_slice(commit);
                }
                v.extend_from_slice(&(recent_responses.len() as u16).to_be_bytes());
                for r in recent_responses {
                    v.extend_from_slice(&r.preimage);
                    v.extend_from_slice(&(r.response.len() as u32).to_be_bytes());
                    v.extend_from_slice(&r.response);
                }
                v
            }
            Self::Send {
                to_id52,
                preimage,
                payload,
            } => {
                let mut v = Vec::with_capacity(68 + payload.len());
                v.extend_from_slice(to_id52);
                v.extend_from_slice(preimage);
                v.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                v.extend_from_slice(payload);
                v
            }
            Self::Deliver {
                correlation,
                payload,
            }
            | Self::Ack {
                correlation,
                payload,
            } => {
                let mut v = Vec::with_capacity(8 + payload.len());
                v.extend_from_slice(&correlation.to_be_bytes());
                v.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                v.extend_from_slice(payload);
                v
            }
            Self::Keepalive => Vec::new(),
            Self::SendResult { status, payload } => {
                let mut v = Vec::with_capacity(5 + payload.len());
                v.push(*status);
                v.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                v.extend_from_slice(payload);
                v
            }
            Self::Presence(record) => {
                let relay = record.relay.as_bytes();
                let mut v = Vec::with_capacity(32 + 2 + relay.len() + 12 + 64);
                v.extend_from_slice(&record.id52);
                v.extend_from_slice(&(relay.len() as u16).to_be_bytes());
                v.extend_from_slice(relay);
                v.extend_from_slice(&record.issued_at.to_be_bytes());
                v.extend_from_slice(&record.ttl_secs.to_be_bytes());
                v.extend_from_slice(&record.signature);
                v
            }
        }
    }

    /// Serializes the full wire frame (header plus payload).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let payload = self.payload_bytes();
        let mut v = Vec::with_capacity(HEADER_LEN + payload.len());
        v.extend_from_slice(&self.frame_type().to_be_bytes());
        v.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        v.extend_from_slice(&payload);
        v
    }

    /// Parses a frame payload against its declared wire type.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if the payload is truncated, an inner length
    /// field overruns the payload, or the type is unknown.
    pub fn parse(msg_type: u16, data: &[u8]) -> Result<Self, FrameError> {
        match msg_type {
            TYPE_HELLO => {
                if data.len() < 9 {
                    return Err(FrameError::TooShort {
                        expected: 9,
                        actual: data.len(),
                    });
                }
                Ok(Self::Hello {
                    version: data[0],
                    nonce: read_u32(data, 1)?,
                    max_payload: read_u32(data, 5)?,
                })
            }
            TYPE_I_AM => parse_i_am(data),
            TYPE_SEND => {
                if data.len() < 68 {
                    return Err(FrameError::TooShort {
                        expected: 68,
                        actual: data.len(),
                    });
                }
                let payload_len = read_u32(data, 64)? as usize;
                let payload = data.get(68..68 + payload_len).ok_or(FrameError::Truncated)?;
                Ok(Self::Send {
                    to_id52: try_into_array(&data[0..32])?,
                    preimage: try_into_array(&data[32..64])?,
                    payload: payload.to_vec(),
                })
            }
            TYPE_DELIVER | TYPE_ACK => {
                if data.len() < 8 {
                    return Err(FrameError::TooShort {
                        expected: 8,
                        actual: data.len(),
                    });
                }
                let correlation = read_u32(data, 0)?;
                let payload_len = read_u32(data, 4)? as usize;
                let payload = data.get(8..8 + payload_len).ok_or(FrameError::Truncated)?;
                if msg_type == TYPE_DELIVER {
                    Ok(Self::Deliver {
                        correlation,
                        payload: payload.to_vec(),
                    })
                } else {
                    Ok(Self::Ack {
                        correlation,
                        payload: payload.to_vec(),
                    })
                }
            }
            TYPE_KEEPALIVE => Ok(Self::Keepalive),
            TYPE_SEND_RESULT => {
                if data.len() < 5 {
                    return Err(FrameError::TooShort {
                        expected: 5,
                        actual: data.len(),
                    });
                }
                let payload_len = read_u32(data, 1)? as usize;
                let payload = data.get(5..5 + payload_len).ok_or(FrameError::Truncated)?;
                Ok(Self::SendResult {
                    status: data[0],
                    payload: payload.to_vec(),
                })
            }
            TYPE_PRESENCE => parse_presence(data),
            t => Err(FrameError::UnknownType(t)),
        }
    }
}

fn parse_i_am(data: &[u8]) -> Result<Frame, FrameError> {
    if data.len() < 98 {
        return Err(FrameError::TooShort {
            expected: 98,
            actual: data.len(),
        });
    }
    let id52: Id52 = try_into_array(&data[0..32])?;
    let signature: [u8; 64] = try_into_array(&data[32..96])?;
    let commit_count = read_u16(data, 96)? as usize;

    let commits_end = 98 + commit_count * 32;
    let mut commits = Vec::with_capacity(commit_count);
    for i in 0..commit_count {
        let start = 98 + i * 32;
        let commit = data.get(start..start + 32).ok_or(FrameError::Truncated)?;
        commits.push(try_into_array(commit)?);
    }

    let response_count = read_u16(data, commits_end)? as usize;
    let mut recent_responses = Vec::with_capacity(response_count);
    let mut pos = commits_end + 2;
    for _ in 0..response_count {
        let preimage = data.get(pos..pos + 32).ok_or(FrameError::Truncated)?;
        let resp_len = read_u32(data, pos + 32)? as usize;
        pos += 36;
        let response = data.get(pos..pos + resp_len).ok_or(FrameError::Truncated)?;
        pos += resp_len;
        recent_responses.push(RecentResponse {
            preimage: try_into_array(preimage)?,
            response: response.to_vec(),
        });
    }

    Ok(Frame::IAm {
        id52,
        signature,
        commits,
        recent_responses,
    })
}

fn parse_presence(data: &[u8]) -> Result<Frame, FrameError> {
    if data.len() < 32 + 2 + 12 + 64 {
        return Err(FrameError::TooShort {
            expected: 110,
            actual: data.len(),
        });
    }
    let id52: Id52 = try_into_array(&data[0..32])?;
    let relay_len = read_u16(data, 32)? as usize;
    let relay_bytes = data.get(34..34 + relay_len).ok_or(FrameError::Truncated)?;
    let relay = std::str::from_utf8(relay_bytes)
        .map_err(|_| FrameError::InvalidUtf8)?
        .to_string();
    let mut pos = 34 + relay_len;
    let issued_at = read_u64(data, pos)?;
    pos += 8;
    let ttl_secs = read_u32(data, pos)?;
    pos += 4;
    let signature = data.get(pos..pos + 64).ok_or(FrameError::Truncated)?;
    Ok(Frame::Presence(PresenceRecord {
        id52,
        relay,
        issued_at,
        ttl_secs,
        signature: try_into_array(signature)?,
    }))
}

/// Length-prefixed codec for [`Frame`]s over any `AsyncRead + AsyncWrite`.
///
/// Stateless beyond the bytes currently buffered by `Framed`; decoding
/// restarts cleanly at every frame boundary.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    /// Creates a codec with the given bound on declared payload length.
    #[must_use]
    pub const fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let declared = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if declared > self.max_frame_len {
            return Err(FrameError::FrameTooLarge {
                max: self.max_frame_len,
                actual: declared,
            }
            .into());
        }
        if src.len() < HEADER_LEN + declared {
            src.reserve(HEADER_LEN + declared - src.len());
            return Ok(None);
        }
        let header = src.split_to(HEADER_LEN);
        let msg_type = u16::from_be_bytes([header[0], header[1]]);
        let payload = src.split_to(declared);
        Ok(Some(Frame::parse(msg_type, &payload)?))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload = frame.payload_bytes();
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u16(frame.frame_type());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(frame: &Frame) -> Frame {
        let bytes = frame.serialize();
        let msg_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        Frame::parse(msg_type, &bytes[HEADER_LEN..]).unwrap()
    }

    #[test]
    fn hello_round_trip() {
        let frame = Frame::hello(0xDEAD_BEEF, 65_536);
        let parsed = round_trip(&frame);
        assert_eq!(parsed, frame);
        assert_eq!(parsed.frame_type(), TYPE_HELLO);
    }

    #[test]
    fn send_round_trip() {
        let frame = Frame::send(&[0x01; 32], &[0x02; 32], b"opaque blob");
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn send_with_empty_payload() {
        let frame = Frame::send(&[0x01; 32], &[0x02; 32], &[]);
        if let Frame::Send { payload, .. } = round_trip(&frame) {
            assert!(payload.is_empty());
        } else {
            panic!("expected Send frame");
        }
    }

    #[test]
    fn i_am_round_trip_with_commits_and_responses() {
        let frame = Frame::IAm {
            id52: [0x0A; 32],
            signature: [0x0B; 64],
            commits: vec![[0x0C; 32], [0x0D; 32]],
            recent_responses: vec![RecentResponse {
                preimage: [0x0E; 32],
                response: b"cached answer".to_vec(),
            }],
        };
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn i_am_with_no_commits() {
        let frame = Frame::i_am(&[0x0A; 32], &[0x0B; 64], vec![]);
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn deliver_and_ack_round_trip() {
        let deliver = Frame::deliver(42, b"to recipient");
        assert_eq!(round_trip(&deliver), deliver);
        let ack = Frame::ack(42, b"from recipient");
        assert_eq!(round_trip(&ack), ack);
    }

    #[test]
    fn keepalive_has_empty_payload() {
        let bytes = Frame::keepalive().serialize();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(round_trip(&Frame::keepalive()), Frame::Keepalive);
    }

    #[test]
    fn send_result_round_trip() {
        let frame = Frame::send_result(crate::types::send_status::OK, b"answer".to_vec());
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn presence_round_trip() {
        let frame = Frame::presence(PresenceRecord {
            id52: [0x11; 32],
            relay: "relay-1.example:7331".to_string(),
            issued_at: 1_700_000_000,
            ttl_secs: 300,
            signature: [0x22; 64],
        });
        assert_eq!(round_trip(&frame), frame);
    }

    #[test]
    fn unknown_type_is_error() {
        assert!(matches!(
            Frame::parse(0x00FF, &[]),
            Err(FrameError::UnknownType(0x00FF))
        ));
    }

    #[test]
    fn send_too_short_is_error() {
        assert!(matches!(
            Frame::parse(TYPE_SEND, &[0u8; 10]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn send_with_overrunning_inner_length_is_error() {
        let mut payload = Frame::send(&[1; 32], &[2; 32], b"abc").payload_bytes();
        // Declare more payload bytes than are present.
        payload[64..68].copy_from_slice(&1000u32.to_be_bytes());
        assert_eq!(
            Frame::parse(TYPE_SEND, &payload),
            Err(FrameError::Truncated)
        );
    }

    #[test]
    fn i_am_with_truncated_commits_is_error() {
        let mut payload = Frame::i_am(&[1; 32], &[2; 64], vec![[3; 32]]).payload_bytes();
        payload.truncate(payload.len() - 20);
        assert!(Frame::parse(TYPE_I_AM, &payload).is_err());
    }

    #[test]
    fn presence_with_bad_utf8_relay_is_error() {
        let mut payload = Frame::presence(PresenceRecord {
            id52: [1; 32],
            relay: "ab".to_string(),
            issued_at: 0,
            ttl_secs: 60,
            signature: [0; 64],
        })
        .payload_bytes();
        payload[34] = 0xFF;
        payload[35] = 0xFE;
        assert_eq!(
            Frame::parse(TYPE_PRESENCE, &payload),
            Err(FrameError::InvalidUtf8)
        );
    }

    #[test]
    fn codec_decodes_partial_input_incrementally() {
        let mut codec = FrameCodec::default();
        let bytes = Frame::send(&[1; 32], &[2; 32], b"payload").serialize();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&bytes[..4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[4..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[10..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame, Frame::Send { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_decodes_back_to_back_frames() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::keepalive().serialize());
        buf.extend_from_slice(&Frame::deliver(7, b"x").serialize());

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Keepalive));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::deliver(7, b"x"))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn codec_rejects_oversized_declared_length() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.put_u16(TYPE_SEND);
        buf.put_u32(2048);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Frame(FrameError::FrameTooLarge { max: 1024, actual: 2048 })
        ));
    }

    #[test]
    fn codec_encoder_matches_serialize() {
        let frame = Frame::send_result(0, b"resp".to_vec());
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..], &frame.serialize()[..]);
    }
}
