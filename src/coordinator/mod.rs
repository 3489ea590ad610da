//! Update coordinator: interaction-aware, rate-limited release of queued updates
//!
//! Bursty updates are queued (bounded, two priority tiers) and released one at
//! a time by a background loop. Releases are spaced at least one animation
//! duration apart and held entirely while the user is interacting.

mod queue;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::types::{Priority, QueuedUpdate};
use crate::utils::{invoke_guarded, HandlerResult, ScheduledTask};

pub use queue::{EnqueueOutcome, UpdateQueue};

/// Callback receiving a released payload
pub type UpdateCallback<T> = Arc<dyn Fn(&T) -> HandlerResult + Send + Sync>;

/// Identifies a subscriber for `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Read-only view of the queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus<T> {
    pub size: usize,
    /// The update that would be released next
    pub next_update: Option<T>,
}

/// Release counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub dispatched: u64,
    pub evicted: u64,
    pub dropped: u64,
    pub stale: u64,
    pub cleared: u64,
}

struct CoordinatorState<T> {
    queue: UpdateQueue<T>,
    interacting: bool,
    subscribers: Vec<(SubscriberId, UpdateCallback<T>)>,
    next_subscriber: u64,
    on_start: Option<UpdateCallback<T>>,
    on_complete: Option<UpdateCallback<T>>,
    stats: CoordinatorStats,
    release_task: Option<ScheduledTask>,
}

struct CoordinatorShared<T> {
    state: Mutex<CoordinatorState<T>>,
    animation: Duration,
    stale_after: Option<Duration>,
    wake: Arc<Notify>,
}

/// Queues updates and releases them to subscribers at a UI-friendly pace
///
/// Cheap to clone; clones share one queue.
pub struct UpdateCoordinator<T> {
    shared: Arc<CoordinatorShared<T>>,
}

impl<T> Clone for UpdateCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> UpdateCoordinator<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(capacity: usize, animation: Duration) -> Self {
        Self::with_staleness(capacity, animation, None)
    }

    /// Coordinator that discards entries older than `stale_after` at release time
    pub fn with_staleness(capacity: usize, animation: Duration, stale_after: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(CoordinatorShared {
                state: Mutex::new(CoordinatorState {
                    queue: UpdateQueue::new(capacity),
                    interacting: false,
                    subscribers: Vec::new(),
                    next_subscriber: 0,
                    on_start: None,
                    on_complete: None,
                    stats: CoordinatorStats::default(),
                    release_task: None,
                }),
                animation,
                stale_after,
                wake: Arc::new(Notify::new()),
            }),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::with_staleness(
            config.queue_capacity,
            config.animation_duration(),
            config.stale_after(),
        )
    }

    /// Minimum spacing between two releases
    pub fn animation_duration(&self) -> Duration {
        self.shared.animation
    }

    /// Queue a payload for release
    pub fn queue_update(&self, payload: T, priority: Priority) -> EnqueueOutcome<T> {
        let outcome = {
            let mut state = self.shared.state.lock();
            let outcome = state.queue.push(QueuedUpdate::new(payload, priority));
            match outcome {
                EnqueueOutcome::Queued => {}
                EnqueueOutcome::QueuedEvicting { .. } => state.stats.evicted += 1,
                EnqueueOutcome::Dropped { .. } => state.stats.dropped += 1,
            }
            outcome
        };
        match &outcome {
            EnqueueOutcome::Queued => {}
            EnqueueOutcome::QueuedEvicting { .. } => {
                debug!(?priority, "queue full, evicted oldest normal update")
            }
            EnqueueOutcome::Dropped { .. } => {
                warn!(?priority, "queue full of high-priority updates, update dropped")
            }
        }
        if outcome.is_queued() {
            self.shared.wake.notify_one();
        }
        outcome
    }

    /// Hold (true) or resume (false) releases around a user gesture
    pub fn set_user_interacting(&self, interacting: bool) {
        let changed = {
            let mut state = self.shared.state.lock();
            std::mem::replace(&mut state.interacting, interacting) != interacting
        };
        if changed {
            debug!(interacting, "user interaction changed");
        }
        if !interacting {
            self.shared.wake.notify_one();
        }
    }

    pub fn is_user_interacting(&self) -> bool {
        self.shared.state.lock().interacting
    }

    pub fn get_queue_status(&self) -> QueueStatus<T> {
        let state = self.shared.state.lock();
        QueueStatus {
            size: state.queue.len(),
            next_update: state.queue.peek().map(|update| update.payload.clone()),
        }
    }

    /// Drop every pending update without dispatching it
    pub fn clear_queue(&self) -> usize {
        let mut state = self.shared.state.lock();
        let cleared = state.queue.clear();
        state.stats.cleared += cleared as u64;
        if cleared > 0 {
            debug!(cleared, "update queue cleared");
        }
        cleared
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let callback: UpdateCallback<T> = Arc::new(callback);
        let mut state = self.shared.state.lock();
        state.next_subscriber += 1;
        let id = SubscriberId(state.next_subscriber);
        state.subscribers.push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.shared.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(existing, _)| *existing != id);
        state.subscribers.len() != before
    }

    /// Hook run immediately before each dispatch
    pub fn on_update_start<F>(&self, hook: F)
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.state.lock().on_start = Some(Arc::new(hook));
    }

    /// Hook run immediately after each dispatch
    pub fn on_update_complete<F>(&self, hook: F)
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.state.lock().on_complete = Some(Arc::new(hook));
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.shared.state.lock().stats
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .state
            .lock()
            .release_task
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    /// Start the release loop; no-op if already running
    pub fn start(&self) {
        let mut state = self.shared.state.lock();
        if state.release_task.is_some() {
            return;
        }
        state.release_task = Some(ScheduledTask::spawn(run_release_loop(
            Arc::downgrade(&self.shared),
            self.shared.wake.clone(),
            self.shared.animation,
        )));
    }

    /// Stop the release loop; pending updates stay queued
    pub fn stop(&self) {
        let task = self.shared.state.lock().release_task.take();
        if let Some(task) = task {
            task.cancel();
        }
    }

    /// Release one update to subscribers, if allowed
    ///
    /// Returns false while the user is interacting or when nothing fresh is
    /// queued. Only the release loop calls this, so releases keep the
    /// animation spacing.
    pub(crate) fn release_next(&self) -> bool {
        let (payload, subscribers, on_start, on_complete) = {
            let mut state = self.shared.state.lock();
            if state.interacting {
                return false;
            }
            let update = loop {
                let Some(update) = state.queue.pop() else {
                    return false;
                };
                match self.shared.stale_after {
                    Some(limit) if update.enqueued_at.elapsed() > limit => {
                        state.stats.stale += 1;
                        debug!(
                            age_ms = update.enqueued_at.elapsed().as_millis() as u64,
                            "discarding stale update"
                        );
                    }
                    _ => break update,
                }
            };
            state.stats.dispatched += 1;
            let subscribers: Vec<UpdateCallback<T>> =
                state.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
            (
                update.payload,
                subscribers,
                state.on_start.clone(),
                state.on_complete.clone(),
            )
        };

        if let Some(hook) = on_start {
            invoke_guarded("update start hook", || hook(&payload));
        }
        for subscriber in subscribers {
            invoke_guarded("update subscriber", || subscriber(&payload));
        }
        if let Some(hook) = on_complete {
            invoke_guarded("update complete hook", || hook(&payload));
        }
        true
    }
}

async fn run_release_loop<T>(
    shared: Weak<CoordinatorShared<T>>,
    wake: Arc<Notify>,
    spacing: Duration,
) where
    T: Clone + Send + 'static,
{
    let mut last_release: Option<Instant> = None;
    loop {
        if let Some(last) = last_release {
            tokio::time::sleep_until(last + spacing).await;
        }
        let released = match shared.upgrade() {
            Some(shared) => UpdateCoordinator { shared }.release_next(),
            None => return,
        };
        if released {
            last_release = Some(Instant::now());
        } else {
            wake.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn recorder(
        coordinator: &UpdateCoordinator<Value>,
    ) -> Arc<Mutex<Vec<(Value, Instant)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        coordinator.subscribe(move |payload: &Value| {
            sink.lock().push((payload.clone(), Instant::now()));
            Ok(())
        });
        log
    }

    #[tokio::test(start_paused = true)]
    async fn test_releases_spaced_by_animation_duration() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        let log = recorder(&coordinator);
        let started = Instant::now();

        for i in 0..5 {
            coordinator.queue_update(json!({ "seq": i }), Priority::Normal);
        }
        coordinator.start();
        tokio::time::sleep(Duration::from_millis(450)).await;

        let log = log.lock();
        let order: Vec<i64> = log.iter().map(|(p, _)| p["seq"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        let offsets: Vec<u128> = log.iter().map(|(_, at)| (*at - started).as_millis()).collect();
        assert_eq!(offsets, vec![0, 100, 200, 300, 400]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interaction_holds_releases() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        let log = recorder(&coordinator);
        coordinator.start();
        coordinator.set_user_interacting(true);

        for i in 0..25 {
            coordinator.queue_update(json!(i), Priority::Normal);
        }
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(log.lock().is_empty());
        assert_eq!(coordinator.get_queue_status().size, 20);
        assert_eq!(coordinator.stats().evicted, 5);

        coordinator.set_user_interacting(false);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, json!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interaction_mid_stream_pauses_then_resumes() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        let log = recorder(&coordinator);
        for i in 0..4 {
            coordinator.queue_update(json!(i), Priority::Normal);
        }
        coordinator.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        coordinator.set_user_interacting(true);
        assert_eq!(log.lock().len(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(log.lock().len(), 2);

        coordinator.set_user_interacting(false);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(log.lock().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_first_without_starving_normal() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        let log = recorder(&coordinator);

        coordinator.queue_update(json!("n1"), Priority::Normal);
        coordinator.queue_update(json!("h1"), Priority::High);
        coordinator.queue_update(json!("n2"), Priority::Normal);
        coordinator.queue_update(json!("h2"), Priority::High);
        coordinator.start();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // A new high arrives after normals have started draining
        coordinator.queue_update(json!("h3"), Priority::High);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let order: Vec<Value> = log.lock().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(order, vec![json!("h1"), json!("h2"), json!("h3"), json!("n1"), json!("n2")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_status_is_non_destructive() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        coordinator.queue_update(json!("first"), Priority::Normal);
        coordinator.queue_update(json!("urgent"), Priority::High);

        let status = coordinator.get_queue_status();
        assert_eq!(status.size, 2);
        assert_eq!(status.next_update, Some(json!("urgent")));
        assert_eq!(coordinator.get_queue_status(), status);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_queue_cancels_pending_releases() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        let log = recorder(&coordinator);
        for i in 0..5 {
            coordinator.queue_update(json!(i), Priority::Normal);
        }
        coordinator.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(coordinator.clear_queue(), 4);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(log.lock().len(), 1);
        assert_eq!(coordinator.stats().cleared, 4);
        assert_eq!(coordinator.get_queue_status().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_hooks_wrap_dispatch() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        let events = Arc::new(Mutex::new(Vec::new()));

        let e = events.clone();
        coordinator.on_update_start(move |p: &Value| {
            e.lock().push(format!("start:{p}"));
            Ok(())
        });
        let e = events.clone();
        coordinator.subscribe(move |_: &Value| Err("render failed".into()));
        coordinator.subscribe(move |p: &Value| {
            e.lock().push(format!("apply:{p}"));
            Ok(())
        });
        let e = events.clone();
        coordinator.on_update_complete(move |p: &Value| {
            e.lock().push(format!("complete:{p}"));
            Ok(())
        });

        coordinator.queue_update(json!(7), Priority::Normal);
        assert!(coordinator.release_next());
        assert!(!coordinator.release_next());

        assert_eq!(*events.lock(), vec!["start:7", "apply:7", "complete:7"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_updates_discarded() {
        let coordinator =
            UpdateCoordinator::with_staleness(20, Duration::from_millis(100), Some(Duration::from_secs(1)));
        let log = recorder(&coordinator);

        coordinator.set_user_interacting(true);
        coordinator.queue_update(json!("old"), Priority::Normal);
        tokio::time::advance(Duration::from_secs(2)).await;
        coordinator.queue_update(json!("fresh"), Priority::Normal);
        coordinator.set_user_interacting(false);

        assert!(coordinator.release_next());
        assert_eq!(log.lock()[0].0, json!("fresh"));
        assert_eq!(coordinator.stats().stale, 1);
        assert_eq!(coordinator.stats().dispatched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_and_stop() {
        let coordinator = UpdateCoordinator::new(20, Duration::from_millis(100));
        let log = recorder(&coordinator);
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let id = coordinator.subscribe(move |_: &Value| {
            *c.lock() += 1;
            Ok(())
        });

        assert!(coordinator.unsubscribe(id));
        assert!(!coordinator.unsubscribe(id));

        coordinator.start();
        assert!(coordinator.is_running());
        coordinator.stop();
        assert!(!coordinator.is_running());

        coordinator.queue_update(json!(1), Priority::Normal);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(log.lock().is_empty());
        assert_eq!(coordinator.get_queue_status().size, 1);
        assert_eq!(*count.lock(), 0);
    }
}
