//! The replica supervisor.

use crate::auth::{Signer, Verifier};
use crate::broadcast::{Outbound, SigningBroadcaster};
use crate::envelope::{Envelope, Shard};
use crate::membership::{Membership, SignatoryCache};
use crate::queue::MessageQueue;
use crate::schedule::RoundRobinSchedule;
use crate::storage::{ProcessStorage, ShardJournal};
use crate::timer::TimeoutKind;
use moot_process::{Catcher, Committer, Process, Proposer, Timer, Validator};
use moot_types::{Height, Message, MessageType, Round};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Tunables of a replica.
#[derive(Debug, Clone)]
pub struct Options {
    /// First-round timeout duration.
    pub backoff_base: Duration,
    /// Per-round timeout growth factor.
    pub backoff_exp: f64,
    /// Timeout ceiling.
    pub backoff_max: Duration,
    /// Maximum number of buffered future-height messages.
    pub message_queue_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            backoff_base: Duration::from_secs(20),
            backoff_exp: 1.6,
            backoff_max: Duration::from_secs(300),
            message_queue_capacity: 512,
        }
    }
}

/// Errors from constructing a replica.
#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("participant count must be 3f+1 and at least 4, got {0}")]
    InvalidMembership(usize),
}

/// The application-level collaborators a replica wires into its process.
pub struct Application {
    pub proposer: Arc<dyn Proposer>,
    pub validator: Arc<dyn Validator>,
    pub committer: Arc<dyn Committer>,
    pub catcher: Arc<dyn Catcher>,
}

/// One process in a replicated state machine, bound to a specific shard.
///
/// The replica signs messages before sending them to other replicas, and
/// authenticates messages before accepting them:
///
/// 1. drop foreign-shard envelopes;
/// 2. drop messages from heights already decided;
/// 3. drop senders outside the participant set (cached per membership
///    anchor);
/// 4. drop envelopes whose signature does not verify under the sender;
/// 5. buffer future-height votes, deliver everything else to the process;
/// 6. persist the process state, then drain newly deliverable buffered
///    messages.
///
/// Proposes more than one height ahead are dropped rather than buffered: a
/// replica that far behind recovers by the embedding's resync path, not
/// through the vote buffer.
///
/// A replica is single-threaded; the [`crate::Driver`] funnels concurrent
/// producers into it through one channel.
pub struct Replica {
    shard: Shard,
    process: Process,
    verifier: Arc<dyn Verifier>,
    membership: Arc<dyn Membership>,
    cache: SignatoryCache,
    queue: MessageQueue,
}

impl Replica {
    /// Wire a process to its collaborators and restore any persisted state.
    ///
    /// Fails unless the membership's participant count is `3f + 1` for some
    /// `f ≥ 1`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: Options,
        shard: Shard,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn Verifier>,
        membership: Arc<dyn Membership>,
        storage: Arc<dyn ProcessStorage>,
        outbound: Arc<dyn Outbound>,
        timer: Arc<dyn Timer>,
        app: Application,
    ) -> Result<Self, ReplicaError> {
        let snapshot = membership.latest();
        let n = snapshot.signatories.len();
        if n < 4 || n % 3 != 1 {
            return Err(ReplicaError::InvalidMembership(n));
        }
        let f = (n - 1) / 3;

        let scheduler = Arc::new(RoundRobinSchedule::new((*snapshot.signatories).clone()));
        let broadcaster = Arc::new(SigningBroadcaster::new(shard, signer.clone(), outbound));
        let journal = Arc::new(ShardJournal::new(shard, storage));

        let mut process = Process::new(
            signer.pid(),
            f,
            scheduler,
            app.proposer,
            app.validator,
            timer,
            broadcaster,
            app.committer,
            app.catcher,
            journal,
        );
        process.restore();

        let mut cache = SignatoryCache::default();
        cache.refresh(&snapshot);

        Ok(Replica {
            shard,
            process,
            verifier,
            membership,
            cache,
            queue: MessageQueue::new(options.message_queue_capacity),
        })
    }

    /// Start (or resume) the process.
    pub fn start(&mut self) {
        self.process.start();
        self.process.save();
    }

    /// The height the process is currently deciding.
    pub fn current_height(&self) -> Height {
        self.process.current_height()
    }

    /// The supervised process, for introspection.
    pub fn process(&self) -> &Process {
        &self.process
    }

    /// Number of buffered future-height messages.
    pub fn queued_messages(&self) -> usize {
        self.queue.len()
    }

    /// Authenticate an inbound envelope and feed it to the process.
    pub fn handle_message(&mut self, envelope: Envelope) {
        if envelope.shard != self.shard {
            warn!(expected = %self.shard, got = %envelope.shard, "bad message: wrong shard");
            return;
        }

        let height = envelope.message.height();
        let current = self.process.current_height();
        if height < current {
            debug!(%height, %current, "ignore message: stale height");
            return;
        }
        if envelope.message.message_type() == MessageType::Propose && height > current.next() {
            debug!(%height, %current, "ignore propose: too far ahead");
            return;
        }

        self.cache.refresh(&self.membership.latest());
        let from = envelope.message.from();
        if !self.cache.contains(&from) {
            debug!(%from, "ignore message: sender not a signatory");
            return;
        }

        let digest = envelope.sig_hash();
        if !self
            .verifier
            .verify(&digest, &from, envelope.message.signature())
        {
            warn!(%from, "bad message: unverified signature");
            return;
        }

        // Future-height votes are buffered; everything else goes straight
        // in. A future-height propose reaching this point is at most one
        // height ahead and is dropped by the process's log. Votes are worth
        // keeping because they complete quorums the moment the height
        // advances; a stale propose is not.
        if height > current && envelope.message.message_type() != MessageType::Propose {
            self.queue.push(envelope.message);
        } else {
            self.deliver(envelope.message);
        }

        // Each delivery can advance the height, unlocking more of the
        // buffer.
        loop {
            let deliverable = self.queue.pop_until(self.process.current_height());
            if deliverable.is_empty() {
                break;
            }
            for message in deliverable {
                self.deliver(message);
            }
        }

        self.process.save();
    }

    /// Feed a timeout callback to the process.
    pub fn handle_timeout(&mut self, kind: TimeoutKind, height: Height, round: Round) {
        match kind {
            TimeoutKind::Propose => self.process.on_timeout_propose(height, round),
            TimeoutKind::Prevote => self.process.on_timeout_prevote(height, round),
            TimeoutKind::Precommit => self.process.on_timeout_precommit(height, round),
        }
        self.process.save();
    }

    fn deliver(&mut self, message: Message) {
        match message {
            Message::Propose(propose) => self.process.propose(propose),
            Message::Prevote(prevote) => self.process.prevote(prevote),
            Message::Precommit(precommit) => self.process.precommit(precommit),
        }
    }
}
