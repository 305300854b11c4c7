//! Protocol messages.
//!
//! Three message kinds drive consensus: a proposer's `Propose`, and the two
//! voting messages `Prevote` and `Precommit`. Every message carries the same
//! canonical fields: height, round, sender, signature.

use crate::{Height, Pid, Round, Value};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 65-byte signature over a message digest.
///
/// The signature scheme is chosen by the embedding (the reference uses
/// secp256k1 ECDSA with a recovery byte); this crate only moves the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 65]);

impl Signature {
    /// Byte length of a signature on the wire.
    pub const LEN: usize = 65;

    /// An all-zero signature, used as the placeholder before signing.
    pub const fn zero() -> Self {
        Signature([0u8; 65])
    }

    /// Construct a signature from its raw bytes.
    pub const fn from_bytes(bytes: [u8; 65]) -> Self {
        Signature(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl Visitor<'_> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 130-character hex string")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Signature, E> {
                let mut bytes = [0u8; 65];
                hex::decode_to_slice(s, &mut bytes).map_err(de::Error::custom)?;
                Ok(Signature(bytes))
            }
        }

        deserializer.deserialize_str(SignatureVisitor)
    }
}

/// Wire discriminator for the three message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Propose = 1,
    Prevote = 2,
    Precommit = 3,
}

impl MessageType {
    /// The wire tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag byte.
    pub fn from_tag(tag: u8) -> Option<MessageType> {
        match tag {
            1 => Some(MessageType::Propose),
            2 => Some(MessageType::Prevote),
            3 => Some(MessageType::Precommit),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Propose => f.write_str("propose"),
            MessageType::Prevote => f.write_str("prevote"),
            MessageType::Precommit => f.write_str("precommit"),
        }
    }
}

/// A proposer's suggested value for a `(height, round)`.
///
/// `valid_round` is [`Round::INVALID`] for a fresh proposal, or an earlier
/// round in which the proposer observed a polka for `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Propose {
    pub height: Height,
    pub round: Round,
    pub value: Value,
    pub valid_round: Round,
    pub from: Pid,
    pub signature: Signature,
}

/// A first-phase vote. `value` is a concrete value or [`Value::NIL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prevote {
    pub height: Height,
    pub round: Round,
    pub value: Value,
    pub from: Pid,
    pub signature: Signature,
}

/// A second-phase vote. `value` is a concrete value or [`Value::NIL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precommit {
    pub height: Height,
    pub round: Round,
    pub value: Value,
    pub from: Pid,
    pub signature: Signature,
}

/// Any protocol message.
///
/// A tagged union rather than a trait object: there is no behaviour shared
/// between the kinds beyond the canonical fields, and the wire format needs a
/// closed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Propose(Propose),
    Prevote(Prevote),
    Precommit(Precommit),
}

impl Message {
    /// The kind discriminator.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Propose(_) => MessageType::Propose,
            Message::Prevote(_) => MessageType::Prevote,
            Message::Precommit(_) => MessageType::Precommit,
        }
    }

    /// The height this message belongs to.
    pub fn height(&self) -> Height {
        match self {
            Message::Propose(m) => m.height,
            Message::Prevote(m) => m.height,
            Message::Precommit(m) => m.height,
        }
    }

    /// The round this message belongs to.
    pub fn round(&self) -> Round {
        match self {
            Message::Propose(m) => m.round,
            Message::Prevote(m) => m.round,
            Message::Precommit(m) => m.round,
        }
    }

    /// The claimed sender.
    pub fn from(&self) -> Pid {
        match self {
            Message::Propose(m) => m.from,
            Message::Prevote(m) => m.from,
            Message::Precommit(m) => m.from,
        }
    }

    /// The signature over the message digest.
    pub fn signature(&self) -> &Signature {
        match self {
            Message::Propose(m) => &m.signature,
            Message::Prevote(m) => &m.signature,
            Message::Precommit(m) => &m.signature,
        }
    }

    /// Replace the signature, returning the signed message.
    pub fn with_signature(mut self, signature: Signature) -> Message {
        match &mut self {
            Message::Propose(m) => m.signature = signature,
            Message::Prevote(m) => m.signature = signature,
            Message::Precommit(m) => m.signature = signature,
        }
        self
    }
}

impl From<Propose> for Message {
    fn from(m: Propose) -> Message {
        Message::Propose(m)
    }
}

impl From<Prevote> for Message {
    fn from(m: Prevote) -> Message {
        Message::Prevote(m)
    }
}

impl From<Precommit> for Message {
    fn from(m: Precommit) -> Message {
        Message::Precommit(m)
    }
}
