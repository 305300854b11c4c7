//! Participant-set membership.

use moot_types::Pid;
use std::collections::HashSet;
use std::sync::Arc;

/// Identifies the agreement that established a participant set, typically
/// the hash of the block (or configuration) the set was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor(pub [u8; 32]);

/// A participant set together with the anchor that established it.
#[derive(Debug, Clone)]
pub struct MembershipSnapshot {
    pub anchor: Anchor,
    pub signatories: Arc<Vec<Pid>>,
}

/// Source of the participant set the replica authorizes senders against.
///
/// The set may only change between heights, and every correct replica of a
/// shard must observe the same set at the same anchor.
pub trait Membership: Send + Sync {
    fn latest(&self) -> MembershipSnapshot;
}

/// A fixed participant set, for embeddings without membership rotation.
pub struct StaticMembership {
    snapshot: MembershipSnapshot,
}

impl StaticMembership {
    /// A membership with the given signatories, sorted canonically.
    pub fn new(anchor: Anchor, mut signatories: Vec<Pid>) -> Self {
        signatories.sort();
        signatories.dedup();
        StaticMembership {
            snapshot: MembershipSnapshot {
                anchor,
                signatories: Arc::new(signatories),
            },
        }
    }
}

impl Membership for StaticMembership {
    fn latest(&self) -> MembershipSnapshot {
        self.snapshot.clone()
    }
}

/// Membership test cached per anchor.
///
/// The set lookup can be moderately expensive for a real membership source,
/// so the replica keeps a hash set of the signatories and only rebuilds it
/// when the anchor rotates.
#[derive(Default)]
pub(crate) struct SignatoryCache {
    anchor: Option<Anchor>,
    members: HashSet<Pid>,
}

impl SignatoryCache {
    pub(crate) fn refresh(&mut self, snapshot: &MembershipSnapshot) {
        if self.anchor == Some(snapshot.anchor) {
            return;
        }
        self.anchor = Some(snapshot.anchor);
        self.members = snapshot.signatories.iter().copied().collect();
    }

    pub(crate) fn contains(&self, pid: &Pid) -> bool {
        self.members.contains(pid)
    }
}
