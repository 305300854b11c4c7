//! Per-height message logs with de-duplication and equivocation detection.

use moot_types::{Height, Pid, Precommit, Prevote, Propose, Round, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of inserting a message into the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion<M> {
    /// Stored; transition rules should be re-evaluated.
    Accepted,
    /// Byte-for-byte redelivery of a stored message.
    Duplicate,
    /// Not storable: wrong height, wrong proposer, or invalid value.
    Rejected,
    /// A second, different message from the same sender at the same round.
    /// The first-seen message is retained; `new` is dropped after reporting.
    Equivocation { new: M, old: M },
}

impl<M> Insertion<M> {
    /// Whether the message was stored.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Insertion::Accepted)
    }
}

/// Message storage for the current height.
///
/// Holds at most one propose per round, and one prevote and one precommit
/// per `(round, sender)`. All entries are for the log's height; crossing a
/// height clears them. `BTreeMap`s keep iteration and the persisted form
/// deterministic.
///
/// Only proposes whose value passed the application validator are ever
/// inserted, so validity never needs re-checking by the transition rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LogRepr", into = "LogRepr")]
pub struct MessageLog {
    height: Height,
    proposals: BTreeMap<Round, Propose>,
    prevotes: BTreeMap<Round, BTreeMap<Pid, Prevote>>,
    precommits: BTreeMap<Round, BTreeMap<Pid, Precommit>>,
}

impl MessageLog {
    /// An empty log scoped to `height`.
    pub fn new(height: Height) -> Self {
        MessageLog {
            height,
            proposals: BTreeMap::new(),
            prevotes: BTreeMap::new(),
            precommits: BTreeMap::new(),
        }
    }

    /// The height this log is scoped to.
    pub fn height(&self) -> Height {
        self.height
    }

    /// Drop everything and rescope to `height`.
    pub fn clear(&mut self, height: Height) {
        self.height = height;
        self.proposals.clear();
        self.prevotes.clear();
        self.precommits.clear();
    }

    /// Insert a propose.
    ///
    /// `scheduled_proposer` is the participant the schedule expects for the
    /// propose's round; `valid` is consulted only when the propose would
    /// actually be stored.
    pub fn insert_propose(
        &mut self,
        propose: Propose,
        scheduled_proposer: Pid,
        valid: impl FnOnce(&Value) -> bool,
    ) -> Insertion<Propose> {
        if propose.height != self.height {
            return Insertion::Rejected;
        }
        if let Some(existing) = self.proposals.get(&propose.round) {
            // Entries only exist for the current height, so a differing
            // entry at the same round is a double-propose.
            if *existing == propose {
                return Insertion::Duplicate;
            }
            return Insertion::Equivocation {
                old: existing.clone(),
                new: propose,
            };
        }
        if propose.from != scheduled_proposer {
            return Insertion::Rejected;
        }
        if !valid(&propose.value) {
            return Insertion::Rejected;
        }
        self.proposals.insert(propose.round, propose);
        Insertion::Accepted
    }

    /// Insert a prevote.
    pub fn insert_prevote(&mut self, prevote: Prevote) -> Insertion<Prevote> {
        if prevote.height != self.height {
            return Insertion::Rejected;
        }
        let round = self.prevotes.entry(prevote.round).or_default();
        if let Some(existing) = round.get(&prevote.from) {
            if *existing == prevote {
                return Insertion::Duplicate;
            }
            return Insertion::Equivocation {
                old: existing.clone(),
                new: prevote,
            };
        }
        round.insert(prevote.from, prevote);
        Insertion::Accepted
    }

    /// Insert a precommit.
    pub fn insert_precommit(&mut self, precommit: Precommit) -> Insertion<Precommit> {
        if precommit.height != self.height {
            return Insertion::Rejected;
        }
        let round = self.precommits.entry(precommit.round).or_default();
        if let Some(existing) = round.get(&precommit.from) {
            if *existing == precommit {
                return Insertion::Duplicate;
            }
            return Insertion::Equivocation {
                old: existing.clone(),
                new: precommit,
            };
        }
        round.insert(precommit.from, precommit);
        Insertion::Accepted
    }

    /// The propose stored for `round`, if any.
    pub fn propose_at(&self, round: Round) -> Option<&Propose> {
        self.proposals.get(&round)
    }

    /// Number of prevotes stored for `round`.
    pub fn prevote_count(&self, round: Round) -> usize {
        self.prevotes.get(&round).map_or(0, BTreeMap::len)
    }

    /// Number of prevotes for `value` stored for `round`.
    pub fn prevotes_for(&self, round: Round, value: &Value) -> usize {
        self.prevotes.get(&round).map_or(0, |senders| {
            senders.values().filter(|pv| pv.value == *value).count()
        })
    }

    /// Number of precommits stored for `round`.
    pub fn precommit_count(&self, round: Round) -> usize {
        self.precommits.get(&round).map_or(0, BTreeMap::len)
    }

    /// Number of precommits for `value` stored for `round`.
    pub fn precommits_for(&self, round: Round, value: &Value) -> usize {
        self.precommits.get(&round).map_or(0, |senders| {
            senders.values().filter(|pc| pc.value == *value).count()
        })
    }

    /// Number of distinct messages stored for `round`, across all kinds.
    ///
    /// Used by the round-skip rule: `f + 1` of these prove that at least one
    /// correct participant has moved to `round`.
    pub fn round_message_count(&self, round: Round) -> usize {
        let propose = usize::from(self.proposals.contains_key(&round));
        propose + self.prevote_count(round) + self.precommit_count(round)
    }
}

/// Persisted form: flat message lists. The maps are rebuilt from the fields
/// of the messages themselves, which keeps the on-disk shape independent of
/// the in-memory indexing.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRepr {
    height: Height,
    proposals: Vec<Propose>,
    prevotes: Vec<Prevote>,
    precommits: Vec<Precommit>,
}

impl From<MessageLog> for LogRepr {
    fn from(log: MessageLog) -> Self {
        LogRepr {
            height: log.height,
            proposals: log.proposals.into_values().collect(),
            prevotes: log
                .prevotes
                .into_values()
                .flat_map(BTreeMap::into_values)
                .collect(),
            precommits: log
                .precommits
                .into_values()
                .flat_map(BTreeMap::into_values)
                .collect(),
        }
    }
}

impl From<LogRepr> for MessageLog {
    fn from(repr: LogRepr) -> Self {
        let mut log = MessageLog::new(repr.height);
        for propose in repr.proposals {
            log.proposals.insert(propose.round, propose);
        }
        for prevote in repr.prevotes {
            log.prevotes
                .entry(prevote.round)
                .or_default()
                .insert(prevote.from, prevote);
        }
        for precommit in repr.precommits {
            log.precommits
                .entry(precommit.round)
                .or_default()
                .insert(precommit.from, precommit);
        }
        log
    }
}
