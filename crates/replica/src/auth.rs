//! Signature scheme seams.
//!
//! The replica signs every message it broadcasts and verifies every message
//! it accepts, but the cryptography itself lives outside this workspace.
//! Implementations sign the 32-byte digest produced by
//! [`Envelope::sig_hash`](crate::Envelope::sig_hash).

use moot_types::{Pid, Signature};

/// Signs outbound messages on behalf of this replica's participant.
///
/// `pid` must be the hash of the public key that `sign`'s signatures verify
/// under; the two are presented together to other replicas.
pub trait Signer: Send + Sync {
    fn pid(&self) -> Pid;
    fn sign(&self, digest: &[u8; 32]) -> Signature;
}

/// Verifies inbound message signatures.
///
/// Must return `true` iff `signature` is valid for `digest` under the public
/// key whose hash is `from`. A verifier is consulted only after the sender
/// has passed the membership check.
pub trait Verifier: Send + Sync {
    fn verify(&self, digest: &[u8; 32], from: &Pid, signature: &Signature) -> bool;
}
