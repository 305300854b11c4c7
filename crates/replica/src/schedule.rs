//! Proposer scheduling.

use moot_process::Scheduler;
use moot_types::{Height, Pid, Round};
use std::sync::RwLock;

/// Round-robin proposer schedule weighting the height and round equally:
/// `signatories[(height + round) mod n]` over the canonically sorted set.
///
/// Every correct replica derives the same schedule from the same membership
/// snapshot. `rebase` may only be called between heights, with a set all
/// correct replicas have already agreed on.
pub struct RoundRobinSchedule {
    signatories: RwLock<Vec<Pid>>,
}

impl RoundRobinSchedule {
    /// A schedule over the given signatories, sorted canonically.
    pub fn new(mut signatories: Vec<Pid>) -> Self {
        signatories.sort();
        signatories.dedup();
        RoundRobinSchedule {
            signatories: RwLock::new(signatories),
        }
    }

    /// Replace the signatory set.
    pub fn rebase(&self, mut signatories: Vec<Pid>) {
        signatories.sort();
        signatories.dedup();
        *self.signatories.write().expect("schedule lock poisoned") = signatories;
    }
}

impl Scheduler for RoundRobinSchedule {
    fn schedule(&self, height: Height, round: Round) -> Pid {
        let signatories = self.signatories.read().expect("schedule lock poisoned");
        // Messages can carry arbitrary rounds, so index defensively.
        let slot = (height.0 as i128 + round.0 as i128).rem_euclid(signatories.len() as i128);
        signatories[slot as usize]
    }
}
