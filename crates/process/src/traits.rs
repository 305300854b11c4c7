//! Collaborator seams of the consensus process.
//!
//! The process makes extensive use of dependency injection. Concrete
//! implementations must meet every requirement documented on these traits;
//! the correctness of the algorithm depends on them.

use crate::Snapshot;
use moot_types::{Height, Pid, Precommit, Prevote, Propose, Round, Value};

/// Determines which participant should propose at a given height and round.
///
/// A schedule must be derived solely from the height, the round, and values
/// on which all correct processes have already reached consensus, so that
/// every correct process computes the same proposer.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, height: Height, round: Round) -> Pid;
}

/// Produces new values for consensus when this process is the proposer.
///
/// A proposer must only return values the [`Validator`] accepts, and once it
/// has returned a value for some `(height, round)` it must return the same
/// value on every later call with the same arguments.
pub trait Proposer: Send + Sync {
    fn propose(&self, height: Height, round: Round) -> Value;
}

/// Application predicate for proposed values.
///
/// Must be deterministic. Processes are not required to agree on the
/// validity of a value.
pub trait Validator: Send + Sync {
    fn valid(&self, value: &Value) -> bool;
}

/// Schedules timeout callbacks.
///
/// After a delay proportional to the round, the implementation must invoke
/// the matching `on_timeout_*` method on the process. The invocation goes
/// through the driver, never directly from another thread.
pub trait Timer: Send + Sync {
    fn timeout_propose(&self, height: Height, round: Round);
    fn timeout_prevote(&self, height: Height, round: Round);
    fn timeout_precommit(&self, height: Height, round: Round);
}

/// Broadcasts messages to every participant, including the sender.
///
/// Delivery to self is mandatory: the process counts its own votes by
/// receiving them back like anyone else's. All messages between correct
/// processes are assumed to be eventually delivered, in no particular order.
///
/// Once a value has been broadcast for a message type at some
/// `(height, round)`, a different value must never be broadcast for that
/// same type, height, and round.
pub trait Broadcaster: Send + Sync {
    fn broadcast_propose(&self, height: Height, round: Round, value: Value, valid_round: Round);
    fn broadcast_prevote(&self, height: Height, round: Round, value: Value);
    fn broadcast_precommit(&self, height: Height, round: Round, value: Value);
}

/// Sink for decided values.
///
/// Invoked exactly once per height, in height order. A committed value is
/// final: all correct processes agree on it and will never revert it.
pub trait Committer: Send + Sync {
    fn commit(&self, height: Height, value: Value);
}

/// Sink for detected equivocations, for external punishment.
///
/// `new` is the message that was just received; `old` is the conflicting
/// message already in the log.
pub trait Catcher: Send + Sync {
    fn catch_double_propose(&self, new: &Propose, old: &Propose);
    fn catch_double_prevote(&self, new: &Prevote, old: &Prevote);
    fn catch_double_precommit(&self, new: &Precommit, old: &Precommit);
}

/// Persists process snapshots between events.
///
/// The supervisor saves after every externally-triggered event, so that an
/// unexpected shutdown loses at most the event currently being handled.
pub trait ProcessJournal: Send + Sync {
    fn save(&self, snapshot: &Snapshot);
    fn restore(&self) -> Option<Snapshot>;
}
