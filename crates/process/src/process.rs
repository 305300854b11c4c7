//! The consensus process.

use crate::log::{Insertion, MessageLog};
use crate::state::{OnceFlags, State, Step};
use crate::traits::{
    Broadcaster, Catcher, Committer, ProcessJournal, Proposer, Scheduler, Timer, Validator,
};
use moot_types::{Height, Pid, Precommit, Prevote, Propose, Round, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Everything a process persists: cursor and safety fields, message logs,
/// and the once-per-round latches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: State,
    pub log: MessageLog,
    pub once_flags: OnceFlags,
}

impl Default for Snapshot {
    /// The snapshot of a freshly constructed process.
    fn default() -> Self {
        let state = State::default();
        Snapshot {
            log: MessageLog::new(state.current_height),
            once_flags: OnceFlags::default(),
            state,
        }
    }
}

/// A deterministic finite state machine that communicates with other
/// processes to reach Byzantine fault tolerant consensus on a sequence of
/// values.
///
/// The process ingests authenticated messages (including its own, looped
/// back by the [`Broadcaster`]) and timeout callbacks, and after every
/// accepted event re-tries the transition rules whose inputs could have
/// changed. Rule evaluation is monotone over the message logs, so safety
/// does not depend on delivery order, and redelivery is a no-op.
///
/// Messages from other heights are rejected here; the supervisor buffers
/// future-height traffic and discards the past. It is also assumed to have
/// authenticated and rate-limited everything it delivers.
///
/// A process is not safe for concurrent use: all methods must be called
/// from the single driver thread that owns it.
pub struct Process {
    whoami: Pid,
    f: usize,

    // Input seams that provide data to the process.
    scheduler: Arc<dyn Scheduler>,
    proposer: Arc<dyn Proposer>,
    validator: Arc<dyn Validator>,

    // Output seams that receive data from the process.
    timer: Arc<dyn Timer>,
    broadcaster: Arc<dyn Broadcaster>,
    committer: Arc<dyn Committer>,
    catcher: Arc<dyn Catcher>,
    journal: Arc<dyn ProcessJournal>,

    state: State,
    log: MessageLog,
    once: OnceFlags,
}

impl Process {
    /// Create a process in the default state: height 1, round 0, proposing.
    ///
    /// `f` is the maximum number of Byzantine participants tolerated; the
    /// participant set behind the scheduler must have `3f + 1` members.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        whoami: Pid,
        f: usize,
        scheduler: Arc<dyn Scheduler>,
        proposer: Arc<dyn Proposer>,
        validator: Arc<dyn Validator>,
        timer: Arc<dyn Timer>,
        broadcaster: Arc<dyn Broadcaster>,
        committer: Arc<dyn Committer>,
        catcher: Arc<dyn Catcher>,
        journal: Arc<dyn ProcessJournal>,
    ) -> Self {
        assert!(f >= 1, "invariant violation: f must be at least 1");
        let state = State::default();
        let log = MessageLog::new(state.current_height);
        Process {
            whoami,
            f,
            scheduler,
            proposer,
            validator,
            timer,
            broadcaster,
            committer,
            catcher,
            journal,
            state,
            log,
            once: OnceFlags::default(),
        }
    }

    /// The height currently being decided.
    pub fn current_height(&self) -> Height {
        self.state.current_height
    }

    /// The cursor and safety fields, for introspection.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// A persistable copy of the full process state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            log: self.log.clone(),
            once_flags: self.once.clone(),
        }
    }

    /// Hand the current snapshot to the journal.
    pub fn save(&self) {
        self.journal.save(&self.snapshot());
    }

    /// Replace in-memory state with the journal's snapshot, if one exists.
    ///
    /// Panics if the snapshot violates the coherence invariants; a corrupted
    /// journal is not recoverable.
    pub fn restore(&mut self) {
        let Some(snapshot) = self.journal.restore() else {
            return;
        };
        snapshot.state.assert_coherent();
        assert_eq!(
            snapshot.log.height(),
            snapshot.state.current_height,
            "invariant violation: snapshot log height {} != height {}",
            snapshot.log.height(),
            snapshot.state.current_height,
        );
        debug!(height = %snapshot.state.current_height, round = %snapshot.state.current_round, "restored process state");
        self.state = snapshot.state;
        self.log = snapshot.log;
        self.once = snapshot.once_flags;
    }

    /// Start the process.
    ///
    /// L10: upon start do StartRound(0)
    pub fn start(&mut self) {
        self.start_round(Round::ZERO);
    }

    /// Progress to a new round at the current height.
    ///
    /// This is the only place the current round changes, and the only place
    /// the step moves backwards (to `Proposing`). Because both just changed,
    /// every round-sensitive rule is re-tried before returning.
    ///
    /// L11:
    ///   Function StartRound(round)
    ///     currentRound ← round
    ///     currentStep ← propose
    ///     if proposer(currentHeight, currentRound) = p then
    ///       proposal ← validValue if validValue ≠ nil else getValue()
    ///       broadcast PROPOSAL(currentHeight, currentRound, proposal, validRound)
    ///     else
    ///       schedule OnTimeoutPropose(currentHeight, currentRound)
    pub fn start_round(&mut self, round: Round) {
        debug!(height = %self.state.current_height, round = %round, "starting round");
        self.state.current_round = round;
        self.state.current_step = Step::Proposing;

        let proposer = self
            .scheduler
            .schedule(self.state.current_height, self.state.current_round);
        if proposer == self.whoami {
            let value = if self.state.valid_value.is_nil() {
                self.proposer
                    .propose(self.state.current_height, self.state.current_round)
            } else {
                self.state.valid_value
            };
            self.broadcaster.broadcast_propose(
                self.state.current_height,
                self.state.current_round,
                value,
                self.state.valid_round,
            );
        } else {
            self.timer
                .timeout_propose(self.state.current_height, self.state.current_round);
        }

        // The round and step just changed; once-flags protect the rules that
        // must not fire twice.
        self.try_precommit_on_polka();
        self.try_precommit_nil();
        self.try_prevote_on_propose();
        self.try_prevote_on_earlier_polka();
        self.try_schedule_precommit_timeout();
        self.try_schedule_prevote_timeout();
    }

    /// Ingest a propose (including ones this process broadcast itself). All
    /// rules that the message could open are re-tried.
    pub fn propose(&mut self, propose: Propose) {
        let scheduled = self.scheduler.schedule(propose.height, propose.round);
        let validator = Arc::clone(&self.validator);
        let round = propose.round;
        match self
            .log
            .insert_propose(propose, scheduled, |value| validator.valid(value))
        {
            Insertion::Accepted => {}
            Insertion::Duplicate | Insertion::Rejected => return,
            Insertion::Equivocation { new, old } => {
                warn!(from = %new.from, round = %new.round, "double propose");
                self.catcher.catch_double_propose(&new, &old);
                return;
            }
        }

        self.try_skip_to_future_round(round);
        self.try_commit(round);
        self.try_precommit_on_polka();
        self.try_prevote_on_propose();
        self.try_prevote_on_earlier_polka();
    }

    /// Ingest a prevote. All rules that the message could open are re-tried.
    pub fn prevote(&mut self, prevote: Prevote) {
        let round = prevote.round;
        match self.log.insert_prevote(prevote) {
            Insertion::Accepted => {}
            Insertion::Duplicate | Insertion::Rejected => return,
            Insertion::Equivocation { new, old } => {
                warn!(from = %new.from, round = %new.round, "double prevote");
                self.catcher.catch_double_prevote(&new, &old);
                return;
            }
        }

        self.try_skip_to_future_round(round);
        self.try_precommit_on_polka();
        self.try_precommit_nil();
        self.try_prevote_on_earlier_polka();
        self.try_schedule_prevote_timeout();
    }

    /// Ingest a precommit. All rules that the message could open are
    /// re-tried.
    pub fn precommit(&mut self, precommit: Precommit) {
        let round = precommit.round;
        match self.log.insert_precommit(precommit) {
            Insertion::Accepted => {}
            Insertion::Duplicate | Insertion::Rejected => return,
            Insertion::Equivocation { new, old } => {
                warn!(from = %new.from, round = %new.round, "double precommit");
                self.catcher.catch_double_precommit(&new, &old);
                return;
            }
        }

        self.try_skip_to_future_round(round);
        self.try_commit(round);
        self.try_schedule_precommit_timeout();
    }

    /// Propose timeout callback. Must only be called after the process
    /// requested it through the [`Timer`].
    ///
    /// L57: if height = currentHeight ∧ round = currentRound ∧
    ///      currentStep = propose then broadcast PREVOTE(nil)
    pub fn on_timeout_propose(&mut self, height: Height, round: Round) {
        if height != self.state.current_height
            || round != self.state.current_round
            || self.state.current_step != Step::Proposing
        {
            trace!(%height, %round, "ignoring stale propose timeout");
            return;
        }
        self.broadcaster.broadcast_prevote(
            self.state.current_height,
            self.state.current_round,
            Value::NIL,
        );
        self.step_to_prevoting();
    }

    /// Prevote timeout callback.
    ///
    /// L61: if height = currentHeight ∧ round = currentRound ∧
    ///      currentStep = prevote then broadcast PRECOMMIT(nil)
    pub fn on_timeout_prevote(&mut self, height: Height, round: Round) {
        if height != self.state.current_height
            || round != self.state.current_round
            || self.state.current_step != Step::Prevoting
        {
            trace!(%height, %round, "ignoring stale prevote timeout");
            return;
        }
        self.broadcaster.broadcast_precommit(
            self.state.current_height,
            self.state.current_round,
            Value::NIL,
        );
        self.step_to_precommitting();
    }

    /// Precommit timeout callback.
    ///
    /// L65: if height = currentHeight ∧ round = currentRound then
    ///      StartRound(currentRound + 1)
    pub fn on_timeout_precommit(&mut self, height: Height, round: Round) {
        if height != self.state.current_height || round != self.state.current_round {
            trace!(%height, %round, "ignoring stale precommit timeout");
            return;
        }
        self.start_round(round.next());
    }

    /// L22: upon PROPOSAL(currentHeight, currentRound, v, −1) from the
    /// scheduled proposer while currentStep = propose do
    ///   prevote id(v) if lockedRound = −1 ∨ lockedValue = v, else prevote nil
    ///
    /// Re-tried whenever a propose arrives at the current round, the round
    /// changes, or the lock changes.
    fn try_prevote_on_propose(&mut self) {
        if self.state.current_step != Step::Proposing {
            return;
        }
        let Some(propose) = self.log.propose_at(self.state.current_round) else {
            return;
        };
        if propose.valid_round != Round::INVALID {
            return;
        }

        let value = propose.value;
        let prevote = if self.state.locked_round == Round::INVALID || self.state.locked_value == value
        {
            value
        } else {
            Value::NIL
        };
        self.broadcaster.broadcast_prevote(
            self.state.current_height,
            self.state.current_round,
            prevote,
        );
        self.step_to_prevoting();
    }

    /// L28: upon PROPOSAL(currentHeight, currentRound, v, vr) from the
    /// scheduled proposer AND 2f+1 PREVOTE(currentHeight, vr, id(v))
    /// while currentStep = propose ∧ 0 ≤ vr < currentRound do
    ///   prevote id(v) if lockedRound ≤ vr ∨ lockedValue = v, else prevote nil
    ///
    /// Re-tried whenever a propose arrives at the current round, a prevote
    /// arrives at any round, the round changes, or the lock changes.
    fn try_prevote_on_earlier_polka(&mut self) {
        if self.state.current_step != Step::Proposing {
            return;
        }
        let Some(propose) = self.log.propose_at(self.state.current_round) else {
            return;
        };
        let valid_round = propose.valid_round;
        if !valid_round.is_valid() || valid_round >= self.state.current_round {
            return;
        }
        let value = propose.value;
        if self.log.prevotes_for(valid_round, &value) < 2 * self.f + 1 {
            return;
        }

        let prevote =
            if self.state.locked_round <= valid_round || self.state.locked_value == value {
                value
            } else {
                Value::NIL
            };
        self.broadcaster.broadcast_prevote(
            self.state.current_height,
            self.state.current_round,
            prevote,
        );
        self.step_to_prevoting();
    }

    /// L34: upon 2f+1 PREVOTE(currentHeight, currentRound, ∗) while
    /// currentStep = prevote, for the first time do
    ///   schedule OnTimeoutPrevote(currentHeight, currentRound)
    ///
    /// Re-tried whenever a prevote arrives at the current round, the round
    /// changes, or the step moves to prevoting. The latch is only set when
    /// the rule fires, so a threshold reached later still schedules the
    /// timeout.
    fn try_schedule_prevote_timeout(&mut self) {
        if self
            .once
            .is_set(self.state.current_round, OnceFlags::TIMEOUT_PREVOTE)
        {
            return;
        }
        if self.state.current_step != Step::Prevoting {
            return;
        }
        if self.log.prevote_count(self.state.current_round) >= 2 * self.f + 1 {
            self.timer
                .timeout_prevote(self.state.current_height, self.state.current_round);
            self.once
                .set(self.state.current_round, OnceFlags::TIMEOUT_PREVOTE);
        }
    }

    /// L36: upon PROPOSAL(currentHeight, currentRound, v, ∗) from the
    /// scheduled proposer AND 2f+1 PREVOTE(currentHeight, currentRound,
    /// id(v)) while currentStep ≥ prevote, for the first time do
    ///   if currentStep = prevote: lock v, broadcast PRECOMMIT(id(v))
    ///   validValue ← v; validRound ← currentRound
    ///
    /// Re-tried whenever a propose or prevote arrives at the current round,
    /// the round changes, or the step moves forward.
    fn try_precommit_on_polka(&mut self) {
        if self
            .once
            .is_set(self.state.current_round, OnceFlags::PRECOMMIT_ON_POLKA)
        {
            return;
        }
        if self.state.current_step < Step::Prevoting {
            return;
        }
        let Some(propose) = self.log.propose_at(self.state.current_round) else {
            return;
        };
        let value = propose.value;
        if self.log.prevotes_for(self.state.current_round, &value) < 2 * self.f + 1 {
            return;
        }

        let locking = self.state.current_step == Step::Prevoting;
        if locking {
            self.state.locked_value = value;
            self.state.locked_round = self.state.current_round;
            self.broadcaster.broadcast_precommit(
                self.state.current_height,
                self.state.current_round,
                value,
            );
            self.step_to_precommitting();
        }
        self.state.valid_value = value;
        self.state.valid_round = self.state.current_round;
        self.once
            .set(self.state.current_round, OnceFlags::PRECOMMIT_ON_POLKA);

        if locking {
            // The lock changed, which is an input to the prevote rules.
            self.try_prevote_on_propose();
            self.try_prevote_on_earlier_polka();
        }
    }

    /// L44: upon 2f+1 PREVOTE(currentHeight, currentRound, nil) while
    /// currentStep = prevote do broadcast PRECOMMIT(nil)
    ///
    /// Re-tried whenever a prevote arrives at the current round, the round
    /// changes, or the step moves to prevoting.
    fn try_precommit_nil(&mut self) {
        if self.state.current_step != Step::Prevoting {
            return;
        }
        if self.log.prevotes_for(self.state.current_round, &Value::NIL) >= 2 * self.f + 1 {
            self.broadcaster.broadcast_precommit(
                self.state.current_height,
                self.state.current_round,
                Value::NIL,
            );
            self.step_to_precommitting();
        }
    }

    /// L47: upon 2f+1 PRECOMMIT(currentHeight, currentRound, ∗) for the
    /// first time do schedule OnTimeoutPrecommit(currentHeight, currentRound)
    ///
    /// Re-tried whenever a precommit arrives at the current round or the
    /// round changes.
    fn try_schedule_precommit_timeout(&mut self) {
        if self
            .once
            .is_set(self.state.current_round, OnceFlags::TIMEOUT_PRECOMMIT)
        {
            return;
        }
        if self.log.precommit_count(self.state.current_round) >= 2 * self.f + 1 {
            self.timer
                .timeout_precommit(self.state.current_height, self.state.current_round);
            self.once
                .set(self.state.current_round, OnceFlags::TIMEOUT_PRECOMMIT);
        }
    }

    /// L49: upon PROPOSAL(currentHeight, r, v, ∗) from the scheduled
    /// proposer AND 2f+1 PRECOMMIT(currentHeight, r, id(v)) do
    ///   commit v, advance the height, reset, StartRound(0)
    ///
    /// Re-tried whenever a propose or precommit arrives, at the round of
    /// that message. Validity needs no re-check: only validated proposes are
    /// ever stored. Double commits at one height are impossible because the
    /// height advances.
    fn try_commit(&mut self, round: Round) {
        let Some(propose) = self.log.propose_at(round) else {
            return;
        };
        let value = propose.value;
        if self.log.precommits_for(round, &value) < 2 * self.f + 1 {
            return;
        }

        info!(height = %self.state.current_height, %value, "value committed");
        self.committer.commit(self.state.current_height, value);

        let next = self.state.current_height.next();
        self.state.current_height = next;
        self.log.clear(next);
        self.once.clear();
        self.state.reset();
        self.start_round(Round::ZERO);
    }

    /// L55: upon f+1 messages at round r > currentRound do StartRound(r)
    ///
    /// Re-tried whenever any message arrives, at the round of that message.
    /// A round increase can only close this condition, so round changes need
    /// no re-try.
    fn try_skip_to_future_round(&mut self, round: Round) {
        if round <= self.state.current_round {
            return;
        }
        if self.log.round_message_count(round) >= self.f + 1 {
            debug!(from = %self.state.current_round, to = %round, "skipping to future round");
            self.start_round(round);
        }
    }

    /// Move to the prevoting step and re-try the rules it opens.
    fn step_to_prevoting(&mut self) {
        self.state.current_step = Step::Prevoting;
        self.try_precommit_on_polka();
        self.try_precommit_nil();
        self.try_schedule_prevote_timeout();
    }

    /// Move to the precommitting step and re-try the rules it opens.
    fn step_to_precommitting(&mut self) {
        self.state.current_step = Step::Precommitting;
        self.try_precommit_on_polka();
    }
}
