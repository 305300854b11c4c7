//! Signing broadcast path.

use crate::auth::Signer;
use crate::envelope::{Envelope, Shard};
use moot_process::Broadcaster;
use moot_types::{Height, Message, Precommit, Prevote, Propose, Round, Signature, Value};
use std::sync::Arc;
use tracing::trace;

/// Fan-out to every replica of the shard.
///
/// Implementations must deliver to the sending replica as well: the process
/// counts its own votes by receiving them back like anyone else's. Delivery
/// is fire-and-forget; reliability is the transport's concern.
pub trait Outbound: Send + Sync {
    fn send(&self, envelope: Envelope);
}

/// The process's [`Broadcaster`], bound to a shard and a [`Signer`].
///
/// Builds the message, signs its digest, and hands the envelope to the
/// [`Outbound`] fan-out.
pub struct SigningBroadcaster {
    shard: Shard,
    signer: Arc<dyn Signer>,
    outbound: Arc<dyn Outbound>,
}

impl SigningBroadcaster {
    pub fn new(shard: Shard, signer: Arc<dyn Signer>, outbound: Arc<dyn Outbound>) -> Self {
        SigningBroadcaster {
            shard,
            signer,
            outbound,
        }
    }

    fn dispatch(&self, message: Message) {
        let digest = moot_types::sig_hash(&message, self.shard.as_bytes());
        let signed = message.with_signature(self.signer.sign(&digest));
        trace!(kind = %signed.message_type(), height = %signed.height(), round = %signed.round(), "broadcasting");
        self.outbound.send(Envelope {
            shard: self.shard,
            message: signed,
        });
    }
}

impl Broadcaster for SigningBroadcaster {
    fn broadcast_propose(&self, height: Height, round: Round, value: Value, valid_round: Round) {
        self.dispatch(Message::Propose(Propose {
            height,
            round,
            value,
            valid_round,
            from: self.signer.pid(),
            signature: Signature::zero(),
        }));
    }

    fn broadcast_prevote(&self, height: Height, round: Round, value: Value) {
        self.dispatch(Message::Prevote(Prevote {
            height,
            round,
            value,
            from: self.signer.pid(),
            signature: Signature::zero(),
        }));
    }

    fn broadcast_precommit(&self, height: Height, round: Round, value: Value) {
        self.dispatch(Message::Precommit(Precommit {
            height,
            round,
            value,
            from: self.signer.pid(),
            signature: Signature::zero(),
        }));
    }
}
