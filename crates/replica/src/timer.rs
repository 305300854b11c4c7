//! Timeout scheduling with exponential backoff.

use crate::driver::ReplicaEvent;
use crate::replica::Options;
use moot_process::Timer;
use moot_types::{Height, Round};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// Which of the three per-round timeouts fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Propose,
    Prevote,
    Precommit,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Propose => f.write_str("propose"),
            TimeoutKind::Prevote => f.write_str("prevote"),
            TimeoutKind::Precommit => f.write_str("precommit"),
        }
    }
}

/// The process's [`Timer`], backed by tokio sleeps.
///
/// Each request spawns a task that sleeps for `min(base · exp^round, max)`
/// and then posts a [`ReplicaEvent::Timeout`] into the driver channel. The
/// delay grows with the round so that, under partial synchrony, every
/// correct replica eventually waits long enough to hear from the others.
///
/// Timeouts are never cancelled: the process ignores callbacks whose height,
/// round, or step no longer match. Must be constructed inside a tokio
/// runtime.
pub struct BackoffTimer {
    base: Duration,
    exp: f64,
    max: Duration,
    events: mpsc::Sender<ReplicaEvent>,
}

impl BackoffTimer {
    pub fn new(base: Duration, exp: f64, max: Duration, events: mpsc::Sender<ReplicaEvent>) -> Self {
        BackoffTimer {
            base,
            exp,
            max,
            events,
        }
    }

    /// A timer using the backoff parameters of the replica's [`Options`].
    pub fn from_options(options: &Options, events: mpsc::Sender<ReplicaEvent>) -> Self {
        BackoffTimer::new(
            options.backoff_base,
            options.backoff_exp,
            options.backoff_max,
            events,
        )
    }

    fn delay(&self, round: Round) -> Duration {
        let exponent = round.0.clamp(0, i32::MAX as i64) as i32;
        let secs = self.base.as_secs_f64() * self.exp.powi(exponent);
        // powi saturates to infinity for large rounds; min caps it.
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }

    fn schedule(&self, kind: TimeoutKind, height: Height, round: Round) {
        let delay = self.delay(round);
        let events = self.events.clone();
        trace!(%kind, %height, %round, ?delay, "scheduling timeout");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The driver may already be gone during shutdown.
            let _ = events
                .send(ReplicaEvent::Timeout {
                    kind,
                    height,
                    round,
                })
                .await;
        });
    }
}

impl Timer for BackoffTimer {
    fn timeout_propose(&self, height: Height, round: Round) {
        self.schedule(TimeoutKind::Propose, height, round);
    }

    fn timeout_prevote(&self, height: Height, round: Round) {
        self.schedule(TimeoutKind::Prevote, height, round);
    }

    fn timeout_precommit(&self, height: Height, round: Round) {
        self.schedule(TimeoutKind::Precommit, height, round);
    }
}
