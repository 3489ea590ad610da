//! Transport client: one persistent live-update channel
//!
//! Owns the connection state machine, the per-kind handler registry, the
//! heartbeat, and reconnection with bounded exponential backoff.
//!
//! ## Task layout
//! - `connect()` runs the open attempt on the caller's task
//! - a session task per open channel reads inbound frames and sends heartbeats
//! - at most one reconnect task sleeps out the backoff delay and retries
//!
//! Spawned tasks hold a `Weak` reference to the client, and their handles are
//! owned by the client state, so `disconnect()` (or dropping the last clone)
//! cancels them.

mod backoff;
pub mod connector;
mod handlers;
pub mod testing;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::types::{ConnectionState, ConnectionStatus, Envelope, CONNECTION_KIND};
use crate::utils::{HandlerResult, ScheduledTask};

pub use backoff::Backoff;
pub use connector::{Connection, Connector, InboundFrame, WsConnector};
pub use handlers::{Handler, HandlerId, HandlerRegistry};

struct ClientState {
    status: ConnectionState,
    should_reconnect: bool,
    backoff: Backoff,
    /// Bumped by every connect attempt and disconnect; stale tasks compare
    /// against it and stand down
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    session: Option<ScheduledTask>,
    reconnect: Option<ScheduledTask>,
}

impl ClientState {
    fn begin_attempt(&mut self) -> u64 {
        self.status = ConnectionState::Connecting;
        self.generation += 1;
        self.generation
    }
}

struct ClientShared {
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<ClientState>,
    handlers: HandlerRegistry,
}

/// Live-update stream client
///
/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct SyncClient {
    shared: Arc<ClientShared>,
}

impl SyncClient {
    /// Create a client using the WebSocket transport
    pub fn new(config: SyncConfig) -> Self {
        Self::with_connector(config, WsConnector)
    }

    /// Create a client with a custom transport
    pub fn with_connector(config: SyncConfig, connector: impl Connector) -> Self {
        let backoff = Backoff::new(
            config.reconnect_floor(),
            config.reconnect_ceiling(),
            config.max_reconnect_attempts,
        );
        Self {
            shared: Arc::new(ClientShared {
                config,
                connector: Arc::new(connector),
                state: Mutex::new(ClientState {
                    status: ConnectionState::Disconnected,
                    should_reconnect: true,
                    backoff,
                    generation: 0,
                    outbound: None,
                    session: None,
                    reconnect: None,
                }),
                handlers: HandlerRegistry::new(),
            }),
        }
    }

    fn upgrade(weak: &Weak<ClientShared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn downgrade(&self) -> Weak<ClientShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    pub fn get_status(&self) -> ConnectionState {
        self.shared.state.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.get_status() == ConnectionState::Connected
    }

    /// Reconnect attempts scheduled since the last successful connection
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state.lock().backoff.attempts()
    }

    /// Open the channel
    ///
    /// Valid from `disconnected` or `errored`; re-enables automatic
    /// reconnection and resets the backoff. Resolves once connected, or
    /// rejects on timeout or transport failure, in which case a bounded
    /// automatic retry is scheduled.
    pub async fn connect(&self) -> ClientResult<()> {
        let (generation, pending_retry) = {
            let mut state = self.shared.state.lock();
            if matches!(
                state.status,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                return Err(ClientError::InvalidState {
                    state: state.status,
                });
            }
            state.should_reconnect = true;
            state.backoff.reset();
            let pending_retry = state.reconnect.take();
            (state.begin_attempt(), pending_retry)
        };
        drop(pending_retry);

        let result = self.attempt(generation).await;
        if matches!(
            result,
            Err(ClientError::Timeout { .. }) | Err(ClientError::Transport(_))
        ) {
            self.schedule_reconnect();
        }
        result
    }

    /// Close the channel and stop automatic reconnection
    ///
    /// Valid from any state; calling it again has no further effect.
    pub fn disconnect(&self) {
        let (previous, session, reconnect) = {
            let mut state = self.shared.state.lock();
            state.should_reconnect = false;
            state.generation += 1;
            state.outbound = None;
            let previous = std::mem::replace(&mut state.status, ConnectionState::Disconnected);
            (previous, state.session.take(), state.reconnect.take())
        };
        for task in [session, reconnect].into_iter().flatten() {
            task.cancel();
        }

        if previous != ConnectionState::Disconnected {
            info!(url = %self.shared.config.endpoint_url, "disconnected");
            self.emit_status(ConnectionStatus::Disconnected);
        }
    }

    /// Serialize and send a message
    ///
    /// Returns false, without raising, unless connected and the frame was
    /// handed to the transport.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(frame) => self.send_frame(frame),
            Err(e) => {
                warn!(error = %e, "outbound message not serializable");
                false
            }
        }
    }

    fn send_frame(&self, frame: String) -> bool {
        let state = self.shared.state.lock();
        if state.status != ConnectionState::Connected {
            return false;
        }
        state
            .outbound
            .as_ref()
            .map_or(false, |outbound| outbound.send(frame).is_ok())
    }

    /// Register a handler for a message kind
    ///
    /// `"connection"` receives status events; `"message"` receives every
    /// inbound data envelope. Handlers run in registration order.
    pub fn on<F>(&self, kind: impl AsRef<str>, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.handlers.register(kind.as_ref(), Arc::new(handler))
    }

    /// Unregister a handler; returns false if it was not registered
    pub fn off(&self, kind: impl AsRef<str>, id: HandlerId) -> bool {
        self.shared.handlers.unregister(kind.as_ref(), id)
    }

    fn emit_status(&self, status: ConnectionStatus) {
        self.emit_event(Envelope::connection(status));
    }

    fn emit_event(&self, event: Envelope) {
        self.shared.handlers.dispatch_kind(CONNECTION_KIND, &event);
    }

    /// One open attempt, bounded by the connect timeout
    async fn attempt(&self, generation: u64) -> ClientResult<()> {
        let config = &self.shared.config;
        debug!(url = %config.endpoint_url, "opening stream");

        let mut pending = PendingAttempt {
            client: self,
            generation,
            settled: false,
        };
        let opened = tokio::time::timeout(
            config.connect_timeout(),
            self.shared.connector.open(&config.endpoint_url),
        )
        .await;
        pending.settled = true;

        let err = match opened {
            Ok(Ok(connection)) => return self.establish(generation, connection),
            Ok(Err(e)) => ClientError::Transport(e),
            Err(_) => ClientError::Timeout {
                timeout_ms: config.connect_timeout_ms,
            },
        };

        {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                return Err(ClientError::Aborted);
            }
            state.status = ConnectionState::Errored;
        }
        warn!(url = %config.endpoint_url, error = %err, "connection attempt failed");
        self.emit_status(ConnectionStatus::Error);
        Err(err)
    }

    fn establish(&self, generation: u64, connection: Connection) -> ClientResult<()> {
        let Connection { outbound, inbound } = connection;
        {
            let mut state = self.shared.state.lock();
            if state.generation != generation || state.status != ConnectionState::Connecting {
                return Err(ClientError::Aborted);
            }
            state.status = ConnectionState::Connected;
            state.backoff.reset();
            state.outbound = Some(outbound);
        }
        info!(url = %self.shared.config.endpoint_url, "stream connected");
        self.emit_status(ConnectionStatus::Connected);

        // Reading starts only once handlers have seen `connected`
        let mut state = self.shared.state.lock();
        if state.generation == generation && state.status == ConnectionState::Connected {
            state.session = Some(ScheduledTask::spawn(run_session(
                self.downgrade(),
                generation,
                inbound,
                self.shared.config.heartbeat_interval(),
            )));
        } else {
            debug!("channel released before its session started");
        }
        Ok(())
    }

    /// Whether a session task still owns the open channel
    fn is_current(&self, generation: u64) -> bool {
        let state = self.shared.state.lock();
        state.generation == generation && state.status == ConnectionState::Connected
    }

    /// Parse and dispatch one inbound frame
    ///
    /// Returns false once the session is stale, without dispatching.
    fn handle_frame(&self, generation: u64, frame: &str) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let envelope = match Envelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return true;
            }
        };
        if envelope.is_reserved() {
            warn!(kind = envelope.kind(), "dropping frame with reserved kind");
            return true;
        }
        debug!(kind = envelope.kind(), "frame received");
        self.shared.handlers.dispatch(&envelope);
        true
    }

    fn send_heartbeat(&self) {
        match Envelope::ping().to_frame() {
            Ok(frame) => {
                if !self.send_frame(frame) {
                    debug!("heartbeat skipped, channel not open");
                }
            }
            Err(e) => warn!(error = %e, "heartbeat not serializable"),
        }
    }

    /// Closure not initiated by `disconnect()`
    fn handle_closed(&self, generation: u64, reason: TransportError) {
        {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                return;
            }
            state.status = ConnectionState::Disconnected;
            state.outbound = None;
            // This runs on the session task itself; let it finish normally
            if let Some(session) = state.session.take() {
                session.detach();
            }
        }
        info!(url = %self.shared.config.endpoint_url, %reason, "stream closed unexpectedly");
        self.emit_event(
            Envelope::connection(ConnectionStatus::Disconnected)
                .with_field("reason", Value::String(reason.to_string())),
        );
        self.schedule_reconnect();
    }

    /// Next backoff delay, or emit `failed` once attempts are exhausted
    fn next_retry_delay(&self) -> Option<std::time::Duration> {
        let (delay, attempt) = {
            let mut state = self.shared.state.lock();
            if !state.should_reconnect {
                return None;
            }
            (state.backoff.next_delay(), state.backoff.attempts())
        };
        match delay {
            Some(delay) => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                Some(delay)
            }
            None => {
                warn!(
                    attempts = self.shared.config.max_reconnect_attempts,
                    "giving up on reconnection"
                );
                self.emit_status(ConnectionStatus::Failed);
                None
            }
        }
    }

    fn schedule_reconnect(&self) {
        let Some(delay) = self.next_retry_delay() else {
            return;
        };
        let task = ScheduledTask::spawn(run_reconnect(self.downgrade(), delay));
        let previous = self.shared.state.lock().reconnect.replace(task);
        drop(previous);
    }

    /// Start a scheduled attempt, unless a disconnect or an explicit connect
    /// got there first
    fn begin_reconnect(&self) -> Option<u64> {
        let mut state = self.shared.state.lock();
        if !state.should_reconnect
            || matches!(
                state.status,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            return None;
        }
        Some(state.begin_attempt())
    }
}

/// Resets a `connecting` state left behind when an attempt's future is
/// dropped before the transport answered
struct PendingAttempt<'a> {
    client: &'a SyncClient,
    generation: u64,
    settled: bool,
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.client.shared.state.lock();
        if state.generation == self.generation && state.status == ConnectionState::Connecting {
            state.status = ConnectionState::Disconnected;
            debug!("connection attempt abandoned");
        }
    }
}

/// Read frames and send heartbeats until the channel closes
async fn run_session(
    client: Weak<ClientShared>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
    heartbeat: std::time::Duration,
) {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(client) = SyncClient::upgrade(&client) else { return };
                match frame {
                    Some(InboundFrame::Text(text)) => {
                        if !client.handle_frame(generation, &text) {
                            return;
                        }
                    }
                    Some(InboundFrame::Error(e)) => {
                        warn!(error = %e, "transport error");
                        client.handle_closed(generation, e);
                        return;
                    }
                    Some(InboundFrame::Closed) | None => {
                        client.handle_closed(generation, TransportError::Closed);
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                let Some(client) = SyncClient::upgrade(&client) else { return };
                if !client.is_current(generation) {
                    return;
                }
                client.send_heartbeat();
            }
        }
    }
}

/// Sleep out the backoff, retry, and keep backing off until connected,
/// cancelled, or out of attempts
async fn run_reconnect(client: Weak<ClientShared>, mut delay: std::time::Duration) {
    loop {
        tokio::time::sleep(delay).await;

        let Some(handle) = SyncClient::upgrade(&client) else { return };
        let Some(generation) = handle.begin_reconnect() else { return };
        match handle.attempt(generation).await {
            Ok(()) | Err(ClientError::Aborted) => return,
            Err(_) => {}
        }
        delay = match handle.next_retry_delay() {
            Some(delay) => delay,
            None => return,
        };
    }
}
