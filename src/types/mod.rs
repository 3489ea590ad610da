//! Data types for the synchronization core
//!
//! Wire envelopes, connection states, queued updates and alerts.

mod alert;
mod envelope;
mod status;
mod update;

pub use alert::{Alert, AlertHistoryEntry, Countdown, Severity};
pub use envelope::{Envelope, CONNECTION_KIND, MESSAGE_KIND, PING_KIND, PONG_KIND};
pub use status::{ConnectionState, ConnectionStatus};
pub use update::{Priority, QueuedUpdate};
