//! BFT consensus state machine.
//!
//! This crate implements the Byzantine fault tolerant consensus algorithm
//! described by "The latest gossip on BFT consensus" (Buchman, Kwon,
//! Milosevic, <https://arxiv.org/pdf/1807.04938.pdf>): a three-phase
//! propose / prevote / precommit protocol with rotating proposers and
//! lock-based safety, tolerating `f` Byzantine participants out of `3f + 1`.
//!
//! # Architecture
//!
//! The core is [`Process`], a synchronous deterministic state machine:
//!
//! - **Event-driven**: seven entry points (three message kinds, three
//!   timeouts, round start). There is no control flow threaded through the
//!   algorithm; after every accepted event the process re-tries the fixed
//!   set of transition rules whose inputs could have changed.
//! - **Synchronous**: no async, no `.await`, no internal locks. All methods
//!   must be called from a single driver thread.
//! - **Pure-ish**: mutates itself and invokes injected collaborators, but
//!   performs no I/O of its own.
//!
//! All I/O lives behind collaborator traits: the [`Broadcaster`] fans
//! messages out (including back to self), the [`Timer`]
//! schedules timeout callbacks, the [`Committer`] receives decided values,
//! and the [`Catcher`] receives evidence of equivocation. Collaborators must
//! never call back into the process synchronously; anything that wants to
//! trigger further events posts through the driver.
//!
//! # Terminology
//!
//! - **Height**: position in the agreed sequence (1, 2, ...). One value is
//!   committed per height.
//! - **Round**: attempt number within a height. Advances on timeout or when
//!   `f + 1` participants are observed ahead.
//! - **Polka**: `2f + 1` prevotes for the same value in one round.
//! - **Lock**: having precommitted a value, a correct process refuses to
//!   prevote a different value until a later-round polka releases it.

mod log;
mod process;
mod state;
mod traits;

pub use log::{Insertion, MessageLog};
pub use process::{Process, Snapshot};
pub use state::{OnceFlags, State, Step};
pub use traits::{
    Broadcaster, Catcher, Committer, ProcessJournal, Proposer, Scheduler, Timer, Validator,
};
