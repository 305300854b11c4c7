//! Shard-tagged message envelopes.

use moot_types::{sig_hash, Message, WireError};
use std::fmt;

/// Identifies the participant set a replica serves.
///
/// Replicas silently drop envelopes tagged with a foreign shard, and the
/// shard is mixed into every signature digest so that messages cannot be
/// replayed across shards.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shard([u8; 32]);

impl Shard {
    /// Construct a shard from its raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Shard(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shard({self})")
    }
}

/// A protocol message as it travels between replicas: the message plus the
/// shard it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub shard: Shard,
    pub message: Message,
}

impl Envelope {
    /// The digest the sender signed: the message's canonical bytes with the
    /// shard mixed in.
    pub fn sig_hash(&self) -> [u8; 32] {
        sig_hash(&self.message, self.shard.as_bytes())
    }

    /// Encode to wire bytes: `[shard: 32][message]`.
    pub fn encode(&self) -> Vec<u8> {
        let message = moot_types::encode_message(&self.message);
        let mut bytes = Vec::with_capacity(32 + message.len());
        bytes.extend_from_slice(self.shard.as_bytes());
        bytes.extend_from_slice(&message);
        bytes
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Envelope, WireError> {
        if bytes.len() < 32 {
            return Err(WireError::Truncated {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut shard = [0u8; 32];
        shard.copy_from_slice(&bytes[..32]);
        let message = moot_types::decode_message(&bytes[32..])?;
        Ok(Envelope {
            shard: Shard(shard),
            message,
        })
    }
}
