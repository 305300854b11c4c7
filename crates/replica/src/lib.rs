//! Supervisor around the consensus process.
//!
//! A [`Replica`] binds one [`moot_process::Process`] to a [`Shard`] (a
//! participant set) and stands between it and the network:
//!
//! ```text
//! network → Replica (shard / height / membership / signature checks)
//!         → MessageQueue (future-height buffering)
//!         → Process (ingest, rule re-evaluation)
//!         → { Outbound, Timer, Committer, Catcher }
//! ```
//!
//! The replica signs messages before they leave (via the
//! [`SigningBroadcaster`]) and verifies messages before they are let in. The
//! [`Driver`] funnels inbound envelopes and timer callbacks from any number
//! of producers through one channel into the single thread that owns the
//! process, which is what makes the core safe without internal locks.
//!
//! Cryptography, transport, and durable storage stay behind the [`Signer`],
//! [`Verifier`], [`Outbound`], and [`ProcessStorage`] seams.

mod auth;
mod broadcast;
mod driver;
mod envelope;
mod membership;
mod queue;
mod replica;
mod schedule;
mod storage;
#[cfg(test)]
mod testsupport;
mod timer;

pub use auth::{Signer, Verifier};
pub use broadcast::{Outbound, SigningBroadcaster};
pub use driver::{Driver, ReplicaEvent, ShutdownHandle};
pub use envelope::{Envelope, Shard};
pub use membership::{Anchor, Membership, MembershipSnapshot, StaticMembership};
pub use queue::MessageQueue;
pub use replica::{Application, Options, Replica, ReplicaError};
pub use schedule::RoundRobinSchedule;
pub use storage::{MemoryProcessStorage, ProcessStorage};
pub use timer::{BackoffTimer, TimeoutKind};
