//! Relay state shared by all stream connections

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use crate::types::Envelope;

/// Default broadcast buffer; slower clients are told they lagged
pub const DEFAULT_BUFFER: usize = 1024;

/// Fan-out point for envelopes pushed to every connected client
pub struct RelayState {
    tx: broadcast::Sender<Envelope>,
    clients: AtomicUsize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl RelayState {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            clients: AtomicUsize::new(0),
        }
    }

    /// Send an envelope to every connected client
    ///
    /// Returns how many clients it was queued for.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        // An error only means nobody is listening
        let receivers = self.tx.send(envelope).unwrap_or(0);
        debug!(receivers, "envelope broadcast");
        receivers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Connected stream clients
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    pub(crate) fn client_joined(&self) -> usize {
        self.clients.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn client_left(&self) -> usize {
        self.clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }
}
