//! Buffering for future-height messages.

use moot_types::{Height, Message};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// A bounded buffer of future-height messages, keyed by height.
///
/// Votes that arrive for heights this replica has not reached yet are parked
/// here and re-delivered once the process catches up.
///
/// Admission policy at capacity: the oldest-buffered message at the
/// *highest* height is evicted. Near-future messages are more likely to
/// become deliverable soon than far-future ones, and FIFO order within a
/// height bucket keeps any one sender from crowding out the others.
pub struct MessageQueue {
    capacity: usize,
    len: usize,
    buckets: BTreeMap<Height, VecDeque<Message>>,
}

impl MessageQueue {
    /// A queue holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        MessageQueue {
            capacity,
            len: 0,
            buckets: BTreeMap::new(),
        }
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer a message under its height, evicting if at capacity.
    pub fn push(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }
        if self.len == self.capacity {
            self.evict();
        }
        self.buckets
            .entry(message.height())
            .or_default()
            .push_back(message);
        self.len += 1;
    }

    /// Remove and return every buffered message at or below `height`, in
    /// height order and in arrival order within a height.
    pub fn pop_until(&mut self, height: Height) -> Vec<Message> {
        let mut popped = Vec::new();
        while let Some(entry) = self.buckets.first_entry() {
            if *entry.key() > height {
                break;
            }
            popped.extend(entry.remove());
        }
        self.len -= popped.len();
        popped
    }

    fn evict(&mut self) {
        let Some(mut entry) = self.buckets.last_entry() else {
            return;
        };
        let dropped = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if let Some(message) = dropped {
            self.len -= 1;
            debug!(height = %message.height(), kind = %message.message_type(), "queue full, evicting");
        }
    }
}
