//! Periodic expiry sweep

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::AlertLedger;
use crate::utils::{invoke_guarded, Clock, HandlerResult, ScheduledTask};

/// Ledger shared between the router, the sweeper and the consumer
pub type SharedLedger = Arc<Mutex<AlertLedger>>;

/// Callback receiving the ids moved to history by one sweep
pub type ExpiredCallback = Arc<dyn Fn(&[String]) -> HandlerResult + Send + Sync>;

/// Run `sweep_expired(clock.now())` every `every`
///
/// The first sweep happens one interval after spawning. `on_expired` is called
/// only for sweeps that archived something, after the ledger lock is
/// released. Dropping the returned handle stops the sweeper.
pub fn spawn_sweeper(
    ledger: SharedLedger,
    clock: Arc<dyn Clock>,
    every: Duration,
    on_expired: Option<ExpiredCallback>,
) -> ScheduledTask {
    ScheduledTask::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = clock.now();
            let expired = ledger.lock().sweep_expired(now);
            if expired.is_empty() {
                continue;
            }
            debug!(count = expired.len(), "sweep archived alerts");
            if let Some(callback) = &on_expired {
                invoke_guarded("alert expiry callback", || callback(&expired));
            }
        }
    })
}
