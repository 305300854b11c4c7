//! Height and round counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in the agreed sequence of values.
///
/// Heights are strictly sequential. Height 0 is the genesis value that the
/// participant set is bootstrapped from; consensus itself begins at height 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Height(pub u64);

impl Height {
    /// The height consensus starts at.
    pub const FIRST: Height = Height(1);

    /// The next height.
    pub fn next(self) -> Height {
        Height(self.0 + 1)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attempt number within a height.
///
/// Rounds reset to 0 whenever the height advances. Multiple rounds may be
/// needed at a single height if proposals fail (timeout, Byzantine proposer).
/// [`Round::INVALID`] is the sentinel used for "no such round": a fresh lock,
/// a fresh valid value, or a propose that carries no earlier polka.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Round(pub i64);

impl Round {
    /// Sentinel for "no round".
    pub const INVALID: Round = Round(-1);

    /// The first round of a height.
    pub const ZERO: Round = Round(0);

    /// Whether this is a concrete round rather than the sentinel.
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// The next round.
    pub fn next(self) -> Round {
        Round(self.0 + 1)
    }
}

impl Default for Round {
    fn default() -> Self {
        Round::INVALID
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
