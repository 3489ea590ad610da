//! Live sync facade wiring the client, coordinator and ledger together
//!
//! Inbound alert envelopes go straight to the ledger; every other data
//! envelope is queued on the coordinator for paced release.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::alerts::{spawn_sweeper, AlertLedger, ExpiredCallback, SharedLedger};
use crate::client::{Connector, SyncClient, WsConnector};
use crate::config::SyncConfig;
use crate::coordinator::UpdateCoordinator;
use crate::error::{AlertError, ClientResult, ConfigError};
use crate::types::{Alert, AlertHistoryEntry, Envelope, Priority, MESSAGE_KIND, PING_KIND, PONG_KIND};
use crate::utils::{invoke_guarded, Clock, HandlerResult, ScheduledTask, SystemClock};

/// Callback receiving the active alert list after it changes
pub type AlertsCallback = Arc<dyn Fn(&[Alert]) -> HandlerResult + Send + Sync>;

type AlertListeners = Arc<Mutex<Vec<AlertsCallback>>>;

/// One live connection feeding an update coordinator and an alert ledger
pub struct LiveSync {
    config: SyncConfig,
    client: SyncClient,
    coordinator: UpdateCoordinator<Envelope>,
    ledger: SharedLedger,
    clock: Arc<dyn Clock>,
    listeners: AlertListeners,
    sweeper: Mutex<Option<ScheduledTask>>,
}

impl LiveSync {
    /// WebSocket transport and the system clock
    pub fn new(config: SyncConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, WsConnector, Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: SyncConfig,
        connector: impl Connector,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = SyncClient::with_connector(config.clone(), connector);
        let coordinator = UpdateCoordinator::from_config(&config);
        let ledger: SharedLedger = Arc::new(Mutex::new(AlertLedger::new(config.alert_history_capacity)));
        let listeners: AlertListeners = Arc::new(Mutex::new(Vec::new()));

        let router = Router {
            alert_kind: config.alert_kind.clone(),
            high_priority_kinds: config.high_priority_kinds.clone(),
            coordinator: coordinator.clone(),
            ledger: ledger.clone(),
            listeners: listeners.clone(),
        };
        client.on(MESSAGE_KIND, move |envelope: &Envelope| router.route(envelope));

        Ok(Self {
            config,
            client,
            coordinator,
            ledger,
            clock,
            listeners,
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    pub fn coordinator(&self) -> &UpdateCoordinator<Envelope> {
        &self.coordinator
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Start the release loop and the expiry sweeper
    pub fn start(&self) {
        self.coordinator.start();

        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            let ledger = self.ledger.clone();
            let listeners = self.listeners.clone();
            let on_expired: ExpiredCallback = Arc::new(move |_expired: &[String]| {
                notify_listeners(&ledger, &listeners);
                Ok(())
            });
            *sweeper = Some(spawn_sweeper(
                self.ledger.clone(),
                self.clock.clone(),
                self.config.sweep_interval(),
                Some(on_expired),
            ));
        }
    }

    pub async fn connect(&self) -> ClientResult<()> {
        self.client.connect().await
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    /// Disconnect and stop every background task
    pub fn shutdown(&self) {
        self.client.disconnect();
        self.coordinator.stop();
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.cancel();
        }
        info!("live sync shut down");
    }

    /// Register a callback for changes to the active alert list
    pub fn on_alerts_changed<F>(&self, callback: F)
    where
        F: Fn(&[Alert]) -> HandlerResult + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(callback));
    }

    /// Add an alert that did not arrive over the stream
    pub fn inject_alert(&self, alert: Alert) -> Result<(), AlertError> {
        self.ledger.lock().add_alert(alert)?;
        notify_listeners(&self.ledger, &self.listeners);
        Ok(())
    }

    /// Dismiss an active alert; returns false if it was not active
    pub fn dismiss_alert(&self, id: &str) -> bool {
        let removed = self.ledger.lock().remove_alert(id).is_some();
        if removed {
            notify_listeners(&self.ledger, &self.listeners);
        }
        removed
    }

    pub fn list_active(&self) -> Vec<Alert> {
        self.ledger.lock().list_active()
    }

    pub fn list_history(&self) -> Vec<AlertHistoryEntry> {
        self.ledger.lock().list_history()
    }
}

impl Drop for LiveSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wildcard message handler
struct Router {
    alert_kind: String,
    high_priority_kinds: Vec<String>,
    coordinator: UpdateCoordinator<Envelope>,
    ledger: SharedLedger,
    listeners: AlertListeners,
}

impl Router {
    fn route(&self, envelope: &Envelope) -> HandlerResult {
        let kind = envelope.kind();
        if kind == self.alert_kind {
            let alert = Alert::from_payload(envelope.payload())?;
            let id = alert.id.clone();
            match self.ledger.lock().add_alert(alert) {
                Ok(()) => {}
                Err(AlertError::Duplicate { .. }) => {
                    debug!(alert_id = %id, "duplicate alert ignored");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            notify_listeners(&self.ledger, &self.listeners);
            return Ok(());
        }

        if kind == PING_KIND || kind == PONG_KIND {
            return Ok(());
        }

        let priority = if self.high_priority_kinds.iter().any(|high| high == kind) {
            Priority::High
        } else {
            Priority::Normal
        };
        self.coordinator.queue_update(envelope.clone(), priority);
        Ok(())
    }
}

fn notify_listeners(ledger: &SharedLedger, listeners: &AlertListeners) {
    let callbacks: Vec<AlertsCallback> = listeners.lock().clone();
    if callbacks.is_empty() {
        return;
    }
    let active = ledger.lock().list_active();
    for callback in callbacks {
        invoke_guarded("alerts changed callback", || callback(&active));
    }
}
