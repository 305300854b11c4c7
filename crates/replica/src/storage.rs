//! Process state persistence.

use crate::envelope::Shard;
use moot_process::{ProcessJournal, Snapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

/// Saves and restores process snapshots, keyed by shard.
///
/// The replica saves after every externally-triggered event, so an
/// unexpected shutdown loses at most the event that was being handled.
/// Durable implementations (a database, a file per shard) live outside this
/// workspace.
pub trait ProcessStorage: Send + Sync {
    fn save_state(&self, shard: &Shard, snapshot: &Snapshot);
    fn restore_state(&self, shard: &Shard) -> Option<Snapshot>;
}

/// In-memory [`ProcessStorage`] holding the serialized snapshot bytes.
///
/// Goes through the JSON encoding rather than keeping live values, so that
/// restore exercises the same path a durable store would.
#[derive(Default)]
pub struct MemoryProcessStorage {
    states: Mutex<HashMap<[u8; 32], Vec<u8>>>,
}

impl ProcessStorage for MemoryProcessStorage {
    fn save_state(&self, shard: &Shard, snapshot: &Snapshot) {
        match serde_json::to_vec(snapshot) {
            Ok(bytes) => {
                self.states
                    .lock()
                    .expect("storage lock poisoned")
                    .insert(*shard.as_bytes(), bytes);
            }
            Err(err) => error!(%shard, %err, "failed to serialize snapshot"),
        }
    }

    fn restore_state(&self, shard: &Shard) -> Option<Snapshot> {
        let states = self.states.lock().expect("storage lock poisoned");
        let bytes = states.get(shard.as_bytes())?;
        match serde_json::from_slice(bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(%shard, %err, "discarding unreadable snapshot");
                None
            }
        }
    }
}

/// The process's [`ProcessJournal`], binding a [`ProcessStorage`] to the
/// replica's shard.
pub(crate) struct ShardJournal {
    shard: Shard,
    storage: Arc<dyn ProcessStorage>,
}

impl ShardJournal {
    pub(crate) fn new(shard: Shard, storage: Arc<dyn ProcessStorage>) -> Self {
        ShardJournal { shard, storage }
    }
}

impl ProcessJournal for ShardJournal {
    fn save(&self, snapshot: &Snapshot) {
        self.storage.save_state(&self.shard, snapshot);
    }

    fn restore(&self) -> Option<Snapshot> {
        self.storage.restore_state(&self.shard)
    }
}
