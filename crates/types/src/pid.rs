//! Participant identity.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Public identity of a participant: the 32-byte hash of its public key.
///
/// Pids are totally ordered so that participant sets have a canonical order
/// for round-robin scheduling. The key material behind a pid is never handled
/// by this workspace; proving ownership is the signature scheme's concern.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid([u8; 32]);

impl Pid {
    /// Construct a pid from its raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Pid(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Leading 8 hex chars is enough to tell participants apart in logs.
        f.write_str(&hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", hex::encode(self.0))
    }
}

impl Serialize for Pid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Pid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PidVisitor;

        impl Visitor<'_> for PidVisitor {
            type Value = Pid;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-character hex string")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Pid, E> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes).map_err(de::Error::custom)?;
                Ok(Pid(bytes))
            }
        }

        deserializer.deserialize_str(PidVisitor)
    }
}
