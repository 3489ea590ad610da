//! Queued state updates

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Release priority of a queued update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// A payload waiting in the update coordinator's queue
#[derive(Clone, Debug)]
pub struct QueuedUpdate<T> {
    pub payload: T,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

impl<T> QueuedUpdate<T> {
    pub fn new(payload: T, priority: Priority) -> Self {
        Self {
            payload,
            priority,
            enqueued_at: Instant::now(),
        }
    }
}
