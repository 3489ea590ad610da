//! Bounded two-tier FIFO

use std::collections::VecDeque;

use crate::types::{Priority, QueuedUpdate};

/// Result of offering an update to a full or non-full queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome<T> {
    Queued,
    /// Queued after evicting the oldest normal-priority entry
    QueuedEvicting { evicted: T },
    /// The queue was full of high-priority entries; the offered update was discarded
    Dropped { rejected: T },
}

impl<T> EnqueueOutcome<T> {
    pub fn is_queued(&self) -> bool {
        !matches!(self, Self::Dropped { .. })
    }
}

/// Queue of pending updates; high priority drains first, FIFO within a tier
#[derive(Debug)]
pub struct UpdateQueue<T> {
    high: VecDeque<QueuedUpdate<T>>,
    normal: VecDeque<QueuedUpdate<T>>,
    capacity: usize,
}

impl<T> UpdateQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, update: QueuedUpdate<T>) -> EnqueueOutcome<T> {
        let mut outcome = EnqueueOutcome::Queued;
        if self.len() >= self.capacity {
            match self.normal.pop_front() {
                Some(evicted) => {
                    outcome = EnqueueOutcome::QueuedEvicting {
                        evicted: evicted.payload,
                    }
                }
                None => {
                    return EnqueueOutcome::Dropped {
                        rejected: update.payload,
                    }
                }
            }
        }
        match update.priority {
            Priority::High => self.high.push_back(update),
            Priority::Normal => self.normal.push_back(update),
        }
        outcome
    }

    /// Remove the next update to release
    pub fn pop(&mut self) -> Option<QueuedUpdate<T>> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    /// The update `pop` would return, without removing it
    pub fn peek(&self) -> Option<&QueuedUpdate<T>> {
        self.high.front().or_else(|| self.normal.front())
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every pending entry, returning how many there were
    pub fn clear(&mut self) -> usize {
        let cleared = self.len();
        self.high.clear();
        self.normal.clear();
        cleared
    }
}
