//! Process state and once-flags.

use moot_types::{Height, Round, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The step of the current round.
///
/// Steps only move forward within a round: `Proposing → Prevoting →
/// Precommitting`. Starting a new round (or height) resets to `Proposing`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Step {
    #[default]
    Proposing,
    Prevoting,
    Precommitting,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Proposing => f.write_str("proposing"),
            Step::Prevoting => f.write_str("prevoting"),
            Step::Precommitting => f.write_str("precommitting"),
        }
    }
}

/// The cursor and safety fields of a process.
///
/// Isolated from [`crate::Process`] so it can be persisted and restored as a
/// unit. The locked fields record the value this process precommitted at the
/// current height; the valid fields record the last value it observed a
/// polka for. Both pairs are coherent: the round is [`Round::INVALID`] if and
/// only if the value is [`Value::NIL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub current_height: Height,
    pub current_round: Round,
    pub current_step: Step,
    pub locked_value: Value,
    pub locked_round: Round,
    pub valid_value: Value,
    pub valid_round: Round,
}

impl Default for State {
    fn default() -> Self {
        State {
            // Height 0 is genesis; consensus starts above it.
            current_height: Height::FIRST,
            current_round: Round::ZERO,
            current_step: Step::Proposing,
            locked_value: Value::NIL,
            locked_round: Round::INVALID,
            valid_value: Value::NIL,
            valid_round: Round::INVALID,
        }
    }
}

impl State {
    /// Reset the lock and valid fields for a new height. The cursor fields
    /// are advanced by the caller.
    pub fn reset(&mut self) {
        self.locked_value = Value::NIL;
        self.locked_round = Round::INVALID;
        self.valid_value = Value::NIL;
        self.valid_round = Round::INVALID;
    }

    /// Panic if the lock/valid coherence invariant does not hold.
    ///
    /// A violation means internal corruption (or a corrupted restore) and is
    /// unrecoverable.
    pub fn assert_coherent(&self) {
        assert_eq!(
            self.locked_round == Round::INVALID,
            self.locked_value.is_nil(),
            "invariant violation: lockedRound={} with lockedValue={}",
            self.locked_round,
            self.locked_value,
        );
        assert_eq!(
            self.valid_round == Round::INVALID,
            self.valid_value.is_nil(),
            "invariant violation: validRound={} with validValue={}",
            self.valid_round,
            self.valid_value,
        );
    }
}

/// Per-round latches for the "for the first time" rules.
///
/// Three rules must fire at most once per round: locking on a polka,
/// scheduling the prevote timeout, and scheduling the precommit timeout.
/// Each gets one bit per round; the whole set is cleared on height change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<(Round, u8)>", into = "Vec<(Round, u8)>")]
pub struct OnceFlags {
    flags: BTreeMap<Round, u8>,
}

impl OnceFlags {
    /// Lock + precommit on a polka for the proposed value.
    pub const PRECOMMIT_ON_POLKA: u8 = 1;
    /// Schedule the prevote timeout on `2f + 1` prevotes.
    pub const TIMEOUT_PREVOTE: u8 = 2;
    /// Schedule the precommit timeout on `2f + 1` precommits.
    pub const TIMEOUT_PRECOMMIT: u8 = 4;

    /// Whether `flag` has been latched for `round`.
    pub fn is_set(&self, round: Round, flag: u8) -> bool {
        self.flags.get(&round).is_some_and(|bits| bits & flag == flag)
    }

    /// Latch `flag` for `round`.
    pub fn set(&mut self, round: Round, flag: u8) {
        *self.flags.entry(round).or_default() |= flag;
    }

    /// Clear every latch, in preparation for a new height.
    pub fn clear(&mut self) {
        self.flags.clear();
    }
}

impl From<OnceFlags> for Vec<(Round, u8)> {
    fn from(once: OnceFlags) -> Self {
        once.flags.into_iter().collect()
    }
}

impl From<Vec<(Round, u8)>> for OnceFlags {
    fn from(entries: Vec<(Round, u8)>) -> Self {
        OnceFlags {
            flags: entries.into_iter().collect(),
        }
    }
}
