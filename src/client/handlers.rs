//! Per-kind handler registry
//!
//! Maps a message kind (including the reserved `connection` and `message`
//! kinds) to an ordered list of handlers. Dispatch snapshots the list before
//! invoking, so handlers may register, unregister or call back into the client.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{Envelope, MESSAGE_KIND};
use crate::utils::{invoke_guarded, HandlerResult};

/// Callback invoked with each matching envelope
pub type Handler = Arc<dyn Fn(&Envelope) -> HandlerResult + Send + Sync>;

/// Token returned by registration, used to unregister
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    by_kind: HashMap<String, Vec<(HandlerId, Handler)>>,
}

/// Ordered handler lists keyed by message kind
#[derive(Default)]
pub struct HandlerRegistry {
    inner: Mutex<RegistryInner>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `kind`
    pub fn register(&self, kind: &str, handler: Handler) -> HandlerId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = HandlerId(inner.next_id);
        inner
            .by_kind
            .entry(kind.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a handler; returns false if it was not registered for `kind`
    pub fn unregister(&self, kind: &str, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        let Some(handlers) = inner.by_kind.get_mut(kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            inner.by_kind.remove(kind);
        }
        removed
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.inner.lock().by_kind.get(kind).map_or(0, Vec::len)
    }

    fn snapshot(&self, kind: &str) -> Vec<Handler> {
        self.inner
            .lock()
            .by_kind
            .get(kind)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    /// Invoke every handler registered for exactly `kind`, in registration order
    ///
    /// Returns the number of handlers that failed.
    pub fn dispatch_kind(&self, kind: &str, envelope: &Envelope) -> usize {
        self.snapshot(kind)
            .into_iter()
            .filter(|handler| !invoke_guarded(kind, || handler(envelope)))
            .count()
    }

    /// Kind-specific handlers first, then the wildcard `message` handlers
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let failed = self.dispatch_kind(envelope.kind(), envelope);
        failed + self.dispatch_kind(MESSAGE_KIND, envelope)
    }
}
