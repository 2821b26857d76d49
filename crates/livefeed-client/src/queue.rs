//! Bounded queue of outgoing frames.

use std::collections::VecDeque;

use livefeed_core::protocol::InboundMessage;

use crate::error::ClientError;

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Refuse the new frame.
    RejectNew,
}

/// FIFO of frames waiting for an open connection.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<InboundMessage>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OutboundQueue {
    /// Creates a queue holding at most `capacity` frames.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            policy,
        }
    }

    /// Appends a frame.
    ///
    /// Returns the frame evicted under [`OverflowPolicy::DropOldest`].
    pub fn push(&mut self, message: InboundMessage) -> Result<Option<InboundMessage>, ClientError> {
        if self.capacity == 0 {
            return Err(ClientError::QueueFull);
        }
        let mut evicted = None;
        if self.items.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => evicted = self.items.pop_front(),
                OverflowPolicy::RejectNew => return Err(ClientError::QueueFull),
            }
        }
        self.items.push_back(message);
        Ok(evicted)
    }

    /// Takes the oldest frame.
    pub fn pop(&mut self) -> Option<InboundMessage> {
        self.items.pop_front()
    }

    /// Puts back a frame that could not be written, ahead of everything else.
    ///
    /// Dropped if the queue filled up in the meantime.
    pub fn restore(&mut self, message: InboundMessage) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_front(message);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
