//! Deterministic in-memory cluster for the end-to-end tests.
//!
//! All replicas share one message bus. Delivery is synchronous and
//! single-threaded: `pump` pops one envelope and hands a copy to every
//! replica (including the sender), so every run is reproducible. Timeouts
//! never fire on their own; tests fire them explicitly on the replicas that
//! requested them.

#![allow(dead_code)]

use moot_process::{Catcher, Committer, Proposer, Timer, Validator};
use moot_replica::{
    Anchor, Application, Envelope, MemoryProcessStorage, Options, Outbound, Replica, Shard, Signer,
    StaticMembership, TimeoutKind, Verifier,
};
use moot_types::{Height, Message, Pid, Precommit, Prevote, Propose, Round, Signature, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn pid(index: usize) -> Pid {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x10 * (index as u8 + 1);
    Pid::from_bytes(bytes)
}

pub fn value(seed: u8) -> Value {
    Value::from_bytes([seed; 32])
}

pub fn shard() -> Shard {
    Shard::from_bytes([0x50u8; 32])
}

/// The value the cluster's proposer produces for `(height, round)`.
pub fn proposed_value(height: u64, round: i64) -> Value {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xee;
    bytes[1] = height as u8;
    bytes[2] = round as u8;
    Value::from_bytes(bytes)
}

/// Test signature shape: `digest || pid || nonce`. The nonce mints distinct
/// valid signatures over one payload, like a randomized real scheme.
pub fn test_signature(digest: &[u8; 32], from: &Pid, nonce: u8) -> Signature {
    let mut bytes = [0u8; 65];
    bytes[..32].copy_from_slice(digest);
    bytes[32..64].copy_from_slice(from.as_bytes());
    bytes[64] = nonce;
    Signature::from_bytes(bytes)
}

pub struct TestSigner {
    pid: Pid,
}

impl Signer for TestSigner {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn sign(&self, digest: &[u8; 32]) -> Signature {
        test_signature(digest, &self.pid, 0)
    }
}

pub struct TestVerifier;

impl Verifier for TestVerifier {
    fn verify(&self, digest: &[u8; 32], from: &Pid, signature: &Signature) -> bool {
        let bytes = signature.as_bytes();
        bytes[..32] == digest[..] && bytes[32..64] == from.as_bytes()[..]
    }
}

struct ClusterProposer;

impl Proposer for ClusterProposer {
    fn propose(&self, height: Height, round: Round) -> Value {
        proposed_value(height.0, round.0)
    }
}

struct AcceptAll;

impl Validator for AcceptAll {
    fn valid(&self, _value: &Value) -> bool {
        true
    }
}

/// What one replica's application observed.
#[derive(Default)]
pub struct AppLog {
    pub commits: Arc<Mutex<Vec<(Height, Value)>>>,
    pub double_prevotes: Arc<Mutex<Vec<(Prevote, Prevote)>>>,
    pub double_proposes: Arc<Mutex<Vec<(Propose, Propose)>>>,
    pub double_precommits: Arc<Mutex<Vec<(Precommit, Precommit)>>>,
}

impl AppLog {
    fn application(&self) -> Application {
        Application {
            proposer: Arc::new(ClusterProposer),
            validator: Arc::new(AcceptAll),
            committer: Arc::new(LogCommitter {
                commits: self.commits.clone(),
            }),
            catcher: Arc::new(LogCatcher {
                double_prevotes: self.double_prevotes.clone(),
                double_proposes: self.double_proposes.clone(),
                double_precommits: self.double_precommits.clone(),
            }),
        }
    }

    pub fn committed(&self) -> Vec<(Height, Value)> {
        self.commits.lock().unwrap().clone()
    }
}

struct LogCommitter {
    commits: Arc<Mutex<Vec<(Height, Value)>>>,
}

impl Committer for LogCommitter {
    fn commit(&self, height: Height, value: Value) {
        self.commits.lock().unwrap().push((height, value));
    }
}

struct LogCatcher {
    double_prevotes: Arc<Mutex<Vec<(Prevote, Prevote)>>>,
    double_proposes: Arc<Mutex<Vec<(Propose, Propose)>>>,
    double_precommits: Arc<Mutex<Vec<(Precommit, Precommit)>>>,
}

impl Catcher for LogCatcher {
    fn catch_double_propose(&self, new: &Propose, old: &Propose) {
        self.double_proposes
            .lock()
            .unwrap()
            .push((new.clone(), old.clone()));
    }

    fn catch_double_prevote(&self, new: &Prevote, old: &Prevote) {
        self.double_prevotes
            .lock()
            .unwrap()
            .push((new.clone(), old.clone()));
    }

    fn catch_double_precommit(&self, new: &Precommit, old: &Precommit) {
        self.double_precommits
            .lock()
            .unwrap()
            .push((new.clone(), old.clone()));
    }
}

/// The shared message bus all replicas broadcast into.
#[derive(Default)]
pub struct Bus {
    envelopes: Mutex<VecDeque<Envelope>>,
}

impl Bus {
    fn pop(&self) -> Option<Envelope> {
        self.envelopes.lock().unwrap().pop_front()
    }
}

impl Outbound for Bus {
    fn send(&self, envelope: Envelope) {
        self.envelopes.lock().unwrap().push_back(envelope);
    }
}

/// Records timeout requests instead of scheduling them.
#[derive(Default)]
pub struct TimerLog {
    requests: Mutex<Vec<(TimeoutKind, Height, Round)>>,
}

impl TimerLog {
    pub fn requested(&self, kind: TimeoutKind, height: Height, round: Round) -> bool {
        self.requests
            .lock()
            .unwrap()
            .contains(&(kind, height, round))
    }
}

impl Timer for TimerLog {
    fn timeout_propose(&self, height: Height, round: Round) {
        self.requests
            .lock()
            .unwrap()
            .push((TimeoutKind::Propose, height, round));
    }

    fn timeout_prevote(&self, height: Height, round: Round) {
        self.requests
            .lock()
            .unwrap()
            .push((TimeoutKind::Prevote, height, round));
    }

    fn timeout_precommit(&self, height: Height, round: Round) {
        self.requests
            .lock()
            .unwrap()
            .push((TimeoutKind::Precommit, height, round));
    }
}

pub struct Cluster {
    pub replicas: Vec<Replica>,
    pub apps: Vec<AppLog>,
    pub timers: Vec<Arc<TimerLog>>,
    pub storages: Vec<Arc<MemoryProcessStorage>>,
    pub pids: Vec<Pid>,
    pub bus: Arc<Bus>,
}

impl Cluster {
    /// A cluster of `n` replicas over one bus. `n` must be `3f + 1`.
    pub fn new(n: usize) -> Cluster {
        let pids: Vec<Pid> = (0..n).map(pid).collect();
        let bus = Arc::new(Bus::default());
        let mut replicas = Vec::with_capacity(n);
        let mut apps = Vec::with_capacity(n);
        let mut timers = Vec::with_capacity(n);
        let mut storages = Vec::with_capacity(n);
        for index in 0..n {
            let app = AppLog::default();
            let timer = Arc::new(TimerLog::default());
            let storage = Arc::new(MemoryProcessStorage::default());
            replicas.push(Self::build(index, &pids, &bus, &app, &timer, &storage));
            apps.push(app);
            timers.push(timer);
            storages.push(storage);
        }
        Cluster {
            replicas,
            apps,
            timers,
            storages,
            pids,
            bus,
        }
    }

    fn build(
        index: usize,
        pids: &[Pid],
        bus: &Arc<Bus>,
        app: &AppLog,
        timer: &Arc<TimerLog>,
        storage: &Arc<MemoryProcessStorage>,
    ) -> Replica {
        Replica::new(
            Options::default(),
            shard(),
            Arc::new(TestSigner { pid: pids[index] }),
            Arc::new(TestVerifier),
            Arc::new(StaticMembership::new(Anchor([0u8; 32]), pids.to_vec())),
            storage.clone(),
            bus.clone(),
            timer.clone(),
            app.application(),
        )
        .expect("replica construction")
    }

    pub fn start(&mut self) {
        for replica in &mut self.replicas {
            replica.start();
        }
    }

    /// Rebuild one replica from its persisted state, simulating a crash and
    /// restart. The bus, timer log, and application log are kept.
    pub fn restart(&mut self, index: usize) {
        self.replicas[index] = Self::build(
            index,
            &self.pids,
            &self.bus,
            &self.apps[index],
            &self.timers[index],
            &self.storages[index],
        );
    }

    /// Deliver bus traffic (to every replica, sender included) until `done`
    /// holds. Panics if the bus runs dry or the cluster stops progressing.
    pub fn pump_until(&mut self, mut done: impl FnMut(&Cluster) -> bool) {
        for _ in 0..10_000 {
            if done(self) {
                return;
            }
            let envelope = self
                .bus
                .pop()
                .expect("bus ran dry before the condition held");
            for replica in &mut self.replicas {
                replica.handle_message(envelope.clone());
            }
        }
        panic!("no progress after 10k messages");
    }

    /// Like [`Cluster::pump_until`], but envelopes matching `drop` never
    /// reach anyone.
    pub fn pump_until_dropping(
        &mut self,
        mut done: impl FnMut(&Cluster) -> bool,
        drop: impl Fn(&Envelope) -> bool,
    ) {
        for _ in 0..10_000 {
            if done(self) {
                return;
            }
            let envelope = self
                .bus
                .pop()
                .expect("bus ran dry before the condition held");
            if drop(&envelope) {
                continue;
            }
            for replica in &mut self.replicas {
                replica.handle_message(envelope.clone());
            }
        }
        panic!("no progress after 10k messages");
    }

    /// Deliver bus traffic until the bus is empty, dropping envelopes that
    /// match `drop`. Returns the number of envelopes delivered.
    pub fn pump_all(&mut self, drop: impl Fn(&Envelope) -> bool) -> usize {
        let mut delivered = 0;
        while let Some(envelope) = self.bus.pop() {
            if drop(&envelope) {
                continue;
            }
            for replica in &mut self.replicas {
                replica.handle_message(envelope.clone());
            }
            delivered += 1;
        }
        delivered
    }

    /// Fire a timeout on every replica whose timer recorded the request.
    pub fn fire_requested(&mut self, kind: TimeoutKind, height: Height, round: Round) {
        for index in 0..self.replicas.len() {
            if self.timers[index].requested(kind, height, round) {
                self.replicas[index].handle_timeout(kind, height, round);
            }
        }
    }

    /// Hand-deliver an envelope to every replica, bypassing the bus.
    pub fn inject(&mut self, envelope: Envelope) {
        for replica in &mut self.replicas {
            replica.handle_message(envelope.clone());
        }
    }
}

/// Sign a built message with the test scheme and wrap it in an envelope.
pub fn sign_message(message: Message, nonce: u8) -> Envelope {
    let digest = moot_types::sig_hash(&message, shard().as_bytes());
    let from = message.from();
    Envelope {
        shard: shard(),
        message: message.with_signature(test_signature(&digest, &from, nonce)),
    }
}

pub fn signed_prevote(height: u64, round: i64, value: Value, from: Pid) -> Envelope {
    sign_message(
        Message::Prevote(Prevote {
            height: Height(height),
            round: Round(round),
            value,
            from,
            signature: Signature::zero(),
        }),
        0,
    )
}
