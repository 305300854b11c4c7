//! Shared fixtures for the replica tests.

use crate::{Application, Envelope, Outbound, Shard, Signer, Verifier};
use moot_process::{Catcher, Committer, Proposer, Timer, Validator};
use moot_types::{Height, Message, Pid, Precommit, Prevote, Propose, Round, Signature, Value};
use std::sync::{Arc, Mutex};

pub fn pid(index: usize) -> Pid {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x10 * (index as u8 + 1);
    Pid::from_bytes(bytes)
}

pub fn value(seed: u8) -> Value {
    Value::from_bytes([seed; 32])
}

/// The recognizable signature shape of the test scheme:
/// `digest || pid || nonce`. The nonce lets tests mint a second valid
/// signature over the same payload, the way a randomized real scheme would.
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

impl TestSigner {
    pub fn new(pid: Pid) -> Self {
        TestSigner { pid }
    }
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

pub struct NullOutbound;

impl Outbound for NullOutbound {
    fn send(&self, _envelope: Envelope) {}
}

pub struct NullTimer;

impl Timer for NullTimer {
    fn timeout_propose(&self, _height: Height, _round: Round) {}
    fn timeout_prevote(&self, _height: Height, _round: Round) {}
    fn timeout_precommit(&self, _height: Height, _round: Round) {}
}

/// Records what the application-level collaborators observe, and hands out
/// [`Application`] wirings that feed these records.
#[derive(Default)]
pub struct TestApplication {
    pub commits: Arc<Mutex<Vec<(Height, Value)>>>,
    pub double_proposes: Arc<Mutex<Vec<(Propose, Propose)>>>,
    pub double_prevotes: Arc<Mutex<Vec<(Prevote, Prevote)>>>,
    pub double_precommits: Arc<Mutex<Vec<(Precommit, Precommit)>>>,
}

impl TestApplication {
    pub fn application(&self) -> Application {
        Application {
            proposer: Arc::new(TestProposer),
            validator: Arc::new(AcceptAll),
            committer: Arc::new(RecordingCommitter {
                commits: self.commits.clone(),
            }),
            catcher: Arc::new(RecordingCatcher {
                double_proposes: self.double_proposes.clone(),
                double_prevotes: self.double_prevotes.clone(),
                double_precommits: self.double_precommits.clone(),
            }),
        }
    }
}

pub struct TestProposer;

impl Proposer for TestProposer {
    fn propose(&self, height: Height, round: Round) -> Value {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xee;
        bytes[1] = height.0 as u8;
        bytes[2] = round.0 as u8;
        Value::from_bytes(bytes)
    }
}

pub struct AcceptAll;

impl Validator for AcceptAll {
    fn valid(&self, _value: &Value) -> bool {
        true
    }
}

struct RecordingCommitter {
    commits: Arc<Mutex<Vec<(Height, Value)>>>,
}

impl Committer for RecordingCommitter {
    fn commit(&self, height: Height, value: Value) {
        self.commits.lock().unwrap().push((height, value));
    }
}

struct RecordingCatcher {
    double_proposes: Arc<Mutex<Vec<(Propose, Propose)>>>,
    double_prevotes: Arc<Mutex<Vec<(Prevote, Prevote)>>>,
    double_precommits: Arc<Mutex<Vec<(Precommit, Precommit)>>>,
}

impl Catcher for RecordingCatcher {
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

/// Sign a built message with the test scheme and wrap it in an envelope.
pub fn sign_message(shard: Shard, message: Message, nonce: u8) -> Envelope {
    let digest = moot_types::sig_hash(&message, shard.as_bytes());
    let from = message.from();
    Envelope {
        shard,
        message: message.with_signature(test_signature(&digest, &from, nonce)),
    }
}

pub fn signed_propose(
    shard: Shard,
    height: u64,
    round: i64,
    value: Value,
    valid_round: i64,
    from: Pid,
) -> Envelope {
    sign_message(
        shard,
        Message::Propose(Propose {
            height: Height(height),
            round: Round(round),
            value,
            valid_round: Round(valid_round),
            from,
            signature: Signature::zero(),
        }),
        0,
    )
}

pub fn signed_prevote(shard: Shard, height: u64, round: i64, value: Value, from: Pid) -> Envelope {
    signed_prevote_with_nonce(shard, height, round, value, from, 0)
}

pub fn signed_prevote_with_nonce(
    shard: Shard,
    height: u64,
    round: i64,
    value: Value,
    from: Pid,
    nonce: u8,
) -> Envelope {
    sign_message(
        shard,
        Message::Prevote(Prevote {
            height: Height(height),
            round: Round(round),
            value,
            from,
            signature: Signature::zero(),
        }),
        nonce,
    )
}

pub fn signed_precommit(
    shard: Shard,
    height: u64,
    round: i64,
    value: Value,
    from: Pid,
) -> Envelope {
    sign_message(
        shard,
        Message::Precommit(Precommit {
            height: Height(height),
            round: Round(round),
            value,
            from,
            signature: Signature::zero(),
        }),
        0,
    )
}
