// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packet framing and CBOR helpers.
//!
//! Packet layout:
//!
//! ``MAGIC(4) || VERSION(2) || FLAGS(2) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * PAYLOAD is a CBOR [`Envelope`]
//! * CHECKSUM = blake3-256 over HEADER (first 12 bytes) || PAYLOAD

use blake3::Hasher;
use ciborium::value::Value;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{Envelope, Message};

/// Protocol magic constant "MRGN".
pub const MAGIC: [u8; 4] = *b"MRGN";
/// Wire protocol version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Reserved flags (set to zero for v1).
pub const FLAGS: u16 = 0x0000;
/// Header length in bytes.
pub const HEADER_BYTES: usize = 12;
/// Trailing checksum length in bytes.
pub const CHECKSUM_BYTES: usize = 32;
/// Largest payload accepted by default.
pub const MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// Framing and (de)serialization failures.
#[derive(Debug, Error)]
pub enum WireError {
    /// Fewer bytes than the header announces.
    #[error("incomplete packet")]
    Incomplete,
    /// Packet does not start with [`MAGIC`].
    #[error("bad magic")]
    BadMagic,
    /// Unknown protocol version.
    #[error("unsupported version {0:#06x}")]
    UnsupportedVersion(u16),
    /// Announced payload exceeds the limit.
    #[error("payload too large ({len} > {max})")]
    PayloadTooLarge {
        /// Announced length.
        len: usize,
        /// Limit in force.
        max: usize,
    },
    /// Checksum does not match header and payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// CBOR encoding failed.
    #[error("encode failed: {0}")]
    Encode(String),
    /// CBOR decoding failed or the payload has the wrong shape.
    #[error("decode failed: {0}")]
    Decode(String),
    /// Envelope names an op this version does not know.
    #[error("unknown op {op}")]
    UnknownOp {
        /// Op name carried by the envelope.
        op: String,
        /// Correlation id of the request.
        id: u64,
    },
    /// Envelope is intact but its payload does not fit the op's schema.
    #[error("bad {op} payload: {reason}")]
    BadPayload {
        /// Op name carried by the envelope.
        op: String,
        /// Correlation id of the request.
        id: u64,
        /// Decoder message.
        reason: String,
    },
}

impl WireError {
    /// Correlation id of a well-framed request the peer should still get an
    /// ack for, or `None` when the stream itself is unusable.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            WireError::UnknownOp { id, .. } | WireError::BadPayload { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Encode to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::de::from_reader(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

/// Total frame length announced by the header at the start of `buf`, or
/// `None` while fewer than [`HEADER_BYTES`] are buffered.
pub fn frame_len(buf: &[u8], max_payload: usize) -> Result<Option<usize>, WireError> {
    if buf.len() < HEADER_BYTES {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
    if len > max_payload {
        return Err(WireError::PayloadTooLarge {
            len,
            max: max_payload,
        });
    }
    Ok(Some(HEADER_BYTES + len + CHECKSUM_BYTES))
}

/// A full packet (header + payload + checksum).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw header (12 bytes).
    pub header: [u8; HEADER_BYTES],
    /// CBOR payload bytes.
    pub payload: Vec<u8>,
    /// blake3 checksum over header||payload.
    pub checksum: [u8; CHECKSUM_BYTES],
}

impl Packet {
    /// Build a packet around a CBOR payload.
    pub fn from_payload(payload: Vec<u8>) -> Result<Self, WireError> {
        let len = u32::try_from(payload.len()).map_err(|_| WireError::PayloadTooLarge {
            len: payload.len(),
            max: u32::MAX as usize,
        })?;
        let mut header = [0u8; HEADER_BYTES];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_be_bytes());
        header[6..8].copy_from_slice(&FLAGS.to_be_bytes());
        header[8..12].copy_from_slice(&len.to_be_bytes());
        let checksum = checksum(&header, &payload);
        Ok(Packet {
            header,
            payload,
            checksum,
        })
    }

    /// Concatenate header, payload and checksum.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.payload.len() + CHECKSUM_BYTES);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum);
        out
    }

    /// Encode an envelope into packet bytes.
    pub fn encode_envelope<P: Serialize>(env: &Envelope<P>) -> Result<Vec<u8>, WireError> {
        Ok(Packet::from_payload(to_cbor(env)?)?.into_bytes())
    }

    /// Decode one packet from the front of `bytes`, returning the envelope
    /// and the bytes consumed.
    pub fn decode_envelope<P: DeserializeOwned>(
        bytes: &[u8],
    ) -> Result<(Envelope<P>, usize), WireError> {
        let total = frame_len(bytes, MAX_PAYLOAD)?.ok_or(WireError::Incomplete)?;
        if bytes.len() < total {
            return Err(WireError::Incomplete);
        }
        if bytes[0..4] != MAGIC {
            return Err(WireError::BadMagic);
        }
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let header = &bytes[..HEADER_BYTES];
        let payload = &bytes[HEADER_BYTES..total - CHECKSUM_BYTES];
        if checksum(header, payload) != bytes[total - CHECKSUM_BYTES..total] {
            return Err(WireError::ChecksumMismatch);
        }
        let env: Envelope<P> = from_cbor(payload)?;
        Ok((env, total))
    }
}

fn checksum(header: &[u8], payload: &[u8]) -> [u8; CHECKSUM_BYTES] {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

fn to_value<T: Serialize>(payload: &T) -> Result<Value, WireError> {
    Value::serialized(payload).map_err(|e| WireError::Encode(e.to_string()))
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, WireError> {
    value
        .deserialized()
        .map_err(|e| WireError::Decode(e.to_string()))
}

/// Decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Message carried.
    pub message: Message,
    /// Correlation id.
    pub id: u64,
    /// Logical timestamp.
    pub ts: u64,
    /// Bytes consumed from the input.
    pub used: usize,
}

/// Encode `msg` into a packet with correlation `id` and logical timestamp `ts`.
pub fn encode_message(msg: &Message, id: u64, ts: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        Message::Hello(p) => to_value(p)?,
        Message::HelloAck(p) => to_value(p)?,
        Message::ListComments(p) | Message::ListReplies(p) => to_value(p)?,
        Message::AddComment(p) => to_value(p)?,
        Message::BulkAddComments(p) => to_value(p)?,
        Message::AddReply(p) => to_value(p)?,
        Message::BulkAddReplies(p) => to_value(p)?,
        Message::DeleteComment(p) | Message::AcceptChange(p) | Message::RevertChange(p) => {
            to_value(p)?
        }
        Message::UpdateCommentText(p) => to_value(p)?,
        Message::InspectEdit(p) => to_value(p)?,
        Message::Ack(p) => to_value(p)?,
        Message::Event(p) => to_value(p)?,
    };
    let env = Envelope {
        op: msg.op_name().to_owned(),
        id,
        ts,
        payload,
    };
    Packet::encode_envelope(&env)
}

/// Decode one packet from the front of `bytes`.
///
/// Framing and checksum failures mean the stream is unusable. An intact
/// envelope whose op or payload is wrong yields [`WireError::UnknownOp`] or
/// [`WireError::BadPayload`] carrying the request id.
pub fn decode_message(bytes: &[u8]) -> Result<Decoded, WireError> {
    let (env, used) = Packet::decode_envelope::<Value>(bytes)?;
    let message = match decode_payload(&env.op, &env.payload) {
        Ok(Some(message)) => message,
        Ok(None) => {
            return Err(WireError::UnknownOp {
                op: env.op,
                id: env.id,
            })
        }
        Err(WireError::Decode(reason)) => {
            return Err(WireError::BadPayload {
                op: env.op,
                id: env.id,
                reason,
            })
        }
        Err(err) => return Err(err),
    };
    Ok(Decoded {
        message,
        id: env.id,
        ts: env.ts,
        used,
    })
}

fn decode_payload(op: &str, p: &Value) -> Result<Option<Message>, WireError> {
    let message = match op {
        "hello" => Message::Hello(from_value(p)?),
        "hello_ack" => Message::HelloAck(from_value(p)?),
        "list_comments" => Message::ListComments(from_value(p)?),
        "list_replies" => Message::ListReplies(from_value(p)?),
        "add_comment" => Message::AddComment(from_value(p)?),
        "bulk_add_comments" => Message::BulkAddComments(from_value(p)?),
        "add_reply" => Message::AddReply(from_value(p)?),
        "bulk_add_replies" => Message::BulkAddReplies(from_value(p)?),
        "delete_comment" => Message::DeleteComment(from_value(p)?),
        "update_comment_text" => Message::UpdateCommentText(from_value(p)?),
        "accept_change" => Message::AcceptChange(from_value(p)?),
        "revert_change" => Message::RevertChange(from_value(p)?),
        "inspect_edit" => Message::InspectEdit(from_value(p)?),
        "ack" => Message::Ack(from_value(p)?),
        "event" => Message::Event(from_value(p)?),
        _ => return Ok(None),
    };
    Ok(Some(message))
}

// --- Unit tests -----------------------------------------------------------
