//! Alert ledger: active alerts ordered by severity and recency, with an
//! expiry sweep into a bounded history ring

mod ledger;
mod sweeper;

pub use ledger::{AlertLedger, DEFAULT_HISTORY_CAPACITY};
pub use sweeper::{spawn_sweeper, ExpiredCallback, SharedLedger};
