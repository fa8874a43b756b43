//! Bounded FIFO of reassembled inbound messages.

use std::collections::VecDeque;

use cmdlink_types::config::DEFAULT_QUEUE_CAPACITY;
use cmdlink_types::message::Message;

/// Holds finished messages until the node drains them.
///
/// When full, pushing drops the oldest undelivered message.
pub struct ReceiveQueue {
    items: VecDeque<Message>,
    capacity: usize,
}

impl ReceiveQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a message, returning the evicted head if the queue overflowed.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        self.items.push_back(message);
        if self.items.len() > self.capacity {
            let evicted = self.items.pop_front();
            if let Some(ref m) = evicted {
                log::debug!("receive queue full; dropped message from {}", m.sender);
            }
            evicted
        } else {
            None
        }
    }

    /// Remove the oldest message.
    pub fn try_pop(&mut self) -> Option<Message> {
        self.items.pop_front()
    }
}

impl Default for ReceiveQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
