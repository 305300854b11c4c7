//! Canonical wire format.
//!
//! # Layout
//!
//! ```text
//! [type tag: u8][canonical payload][signature: 65 bytes]
//! ```
//!
//! Payload fields are big-endian fixed width, in declaration order:
//!
//! ```text
//! propose            height: u64 | round: i64 | value: 32 | valid_round: i64 | from: 32
//! prevote/precommit  height: u64 | round: i64 | value: 32 | from: 32
//! ```
//!
//! The encoding is canonical: the same message always encodes to the same
//! bytes, across implementations and languages. This is why it is written by
//! hand instead of going through a serde format, which would not pin a
//! stable cross-language layout.
//!
//! The signature digest is `SHA-256(tag || payload || shard)`. Mixing the
//! shard tag into the digest means a signature produced for one participant
//! set cannot be replayed against another.

use crate::{Height, Message, MessageType, Pid, Precommit, Prevote, Propose, Round, Signature};
use bytes::{Buf, BufMut};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from decoding a wire message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown message type tag {0}")]
    UnknownTag(u8),

    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

const VOTE_PAYLOAD_LEN: usize = 8 + 8 + 32 + 32;
const PROPOSE_PAYLOAD_LEN: usize = VOTE_PAYLOAD_LEN + 8;

/// Encode a message to its canonical bytes.
pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + PROPOSE_PAYLOAD_LEN + Signature::LEN);
    buf.put_u8(message.message_type().tag());
    put_payload(&mut buf, message);
    buf.put_slice(message.signature().as_bytes());
    buf
}

/// Decode a message from its canonical bytes.
///
/// The buffer must contain exactly one message; trailing bytes are an error.
pub fn decode_message(bytes: &[u8]) -> Result<Message, WireError> {
    let mut buf = bytes;
    if buf.remaining() < 1 {
        return Err(WireError::Truncated {
            expected: 1,
            actual: 0,
        });
    }
    let tag = buf.get_u8();
    let message_type = MessageType::from_tag(tag).ok_or(WireError::UnknownTag(tag))?;

    let payload_len = match message_type {
        MessageType::Propose => PROPOSE_PAYLOAD_LEN,
        MessageType::Prevote | MessageType::Precommit => VOTE_PAYLOAD_LEN,
    };
    if buf.remaining() < payload_len + Signature::LEN {
        return Err(WireError::Truncated {
            expected: 1 + payload_len + Signature::LEN,
            actual: bytes.len(),
        });
    }

    let height = Height(buf.get_u64());
    let round = Round(buf.get_i64());
    let value = get_array::<32>(&mut buf);

    let message = match message_type {
        MessageType::Propose => {
            let valid_round = Round(buf.get_i64());
            let from = get_array::<32>(&mut buf);
            Message::Propose(Propose {
                height,
                round,
                value: crate::Value::from_bytes(value),
                valid_round,
                from: Pid::from_bytes(from),
                signature: Signature::from_bytes(get_array::<65>(&mut buf)),
            })
        }
        MessageType::Prevote => {
            let from = get_array::<32>(&mut buf);
            Message::Prevote(Prevote {
                height,
                round,
                value: crate::Value::from_bytes(value),
                from: Pid::from_bytes(from),
                signature: Signature::from_bytes(get_array::<65>(&mut buf)),
            })
        }
        MessageType::Precommit => {
            let from = get_array::<32>(&mut buf);
            Message::Precommit(Precommit {
                height,
                round,
                value: crate::Value::from_bytes(value),
                from: Pid::from_bytes(from),
                signature: Signature::from_bytes(get_array::<65>(&mut buf)),
            })
        }
    };

    if buf.remaining() > 0 {
        return Err(WireError::TrailingBytes(buf.remaining()));
    }
    Ok(message)
}

/// The digest a participant signs: `SHA-256(tag || payload || shard)`.
///
/// The signature bytes themselves are not part of the digest.
pub fn sig_hash(message: &Message, shard: &[u8; 32]) -> [u8; 32] {
    let mut payload = Vec::with_capacity(1 + PROPOSE_PAYLOAD_LEN + 32);
    payload.put_u8(message.message_type().tag());
    put_payload(&mut payload, message);
    payload.put_slice(shard);

    let mut hasher = Sha256::new();
    hasher.update(&payload);
    hasher.finalize().into()
}

fn put_payload(buf: &mut Vec<u8>, message: &Message) {
    match message {
        Message::Propose(m) => {
            buf.put_u64(m.height.0);
            buf.put_i64(m.round.0);
            buf.put_slice(m.value.as_bytes());
            buf.put_i64(m.valid_round.0);
            buf.put_slice(m.from.as_bytes());
        }
        Message::Prevote(m) => {
            buf.put_u64(m.height.0);
            buf.put_i64(m.round.0);
            buf.put_slice(m.value.as_bytes());
            buf.put_slice(m.from.as_bytes());
        }
        Message::Precommit(m) => {
            buf.put_u64(m.height.0);
            buf.put_i64(m.round.0);
            buf.put_slice(m.value.as_bytes());
            buf.put_slice(m.from.as_bytes());
        }
    }
}

fn get_array<const N: usize>(buf: &mut &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    out
}
