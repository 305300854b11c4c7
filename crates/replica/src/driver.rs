//! Single-consumer event driver.

use crate::envelope::Envelope;
use crate::replica::Replica;
use crate::timer::TimeoutKind;
use moot_types::{Height, Round};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Everything that can wake the replica: an authenticated-pending envelope
/// from the network, or a timeout callback posted by the timer.
#[derive(Debug)]
pub enum ReplicaEvent {
    Inbound(Envelope),
    Timeout {
        kind: TimeoutKind,
        height: Height,
        round: Round,
    },
}

/// Handle for stopping a running [`Driver`].
///
/// Signals the driver to return promptly; dropping the handle signals too.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Owns a [`Replica`] and feeds it from a single event channel.
///
/// Any number of producers (network readers, timer tasks) hold the channel's
/// sender; the driver is the only consumer, which gives the process its
/// single-threaded execution model without internal locks. Collaborators
/// that want to trigger further events post back through the same channel.
pub struct Driver {
    replica: Replica,
    events: mpsc::Receiver<ReplicaEvent>,
    shutdown: oneshot::Receiver<()>,
}

impl Driver {
    /// An event channel for wiring producers to a driver.
    pub fn channel(capacity: usize) -> (mpsc::Sender<ReplicaEvent>, mpsc::Receiver<ReplicaEvent>) {
        mpsc::channel(capacity)
    }

    /// Wrap a replica and its event source.
    pub fn new(replica: Replica, events: mpsc::Receiver<ReplicaEvent>) -> (Self, ShutdownHandle) {
        let (tx, rx) = oneshot::channel();
        (
            Driver {
                replica,
                events,
                shutdown: rx,
            },
            ShutdownHandle { tx: Some(tx) },
        )
    }

    /// The supervised replica, for introspection.
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Start the replica and deliver events until shutdown is signalled or
    /// every sender is gone.
    pub async fn run(mut self) -> Replica {
        self.replica.start();
        loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    debug!("driver shutting down");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(ReplicaEvent::Inbound(envelope)) => {
                        self.replica.handle_message(envelope);
                    }
                    Some(ReplicaEvent::Timeout { kind, height, round }) => {
                        self.replica.handle_timeout(kind, height, round);
                    }
                    None => {
                        debug!("event channel closed");
                        break;
                    }
                },
            }
        }
        self.replica
    }
}
