//! Opaque application values.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An opaque 32-byte application payload on which consensus is reached.
///
/// In a replicated state machine this is typically the hash of a block; the
/// consensus core never looks inside it. [`Value::NIL`] is the distinguished
/// "no value" used by nil prevotes and precommits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Value([u8; 32]);

impl Value {
    /// The distinguished nil value.
    pub const NIL: Value = Value([0u8; 32]);

    /// Construct a value from its raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Value(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the nil value.
    pub fn is_nil(&self) -> bool {
        *self == Value::NIL
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("nil")
        } else {
            f.write_str(&hex::encode(&self.0[..4]))
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", hex::encode(self.0))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl Visitor<'_> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-character hex string")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes).map_err(de::Error::custom)?;
                Ok(Value(bytes))
            }
        }

        deserializer.deserialize_str(ValueVisitor)
    }
}
