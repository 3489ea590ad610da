//! In-memory connector for driving the client in tests
//!
//! Each accepted `open` hands the test a [`MockRemote`]: the server side of
//! the channel pair.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::connector::{Connection, Connector, InboundFrame};
use crate::error::TransportError;
use crate::types::Envelope;

/// How the mock answers an `open` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehaviour {
    /// Open successfully after the given delay
    Accept { after: Duration },
    /// Open after the given delay with frames already waiting on the channel
    AcceptWith {
        after: Duration,
        frames: Vec<InboundFrame>,
    },
    /// Fail immediately
    Refuse,
    /// Never complete
    Hang,
}

struct MockPlan {
    default: MockBehaviour,
    scripted: VecDeque<MockBehaviour>,
    attempts: Vec<Instant>,
}

struct MockShared {
    plan: Mutex<MockPlan>,
    remotes_tx: mpsc::UnboundedSender<MockRemote>,
    remotes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockRemote>>,
}

/// Channel-backed [`Connector`]
#[derive(Clone)]
pub struct MockConnector {
    shared: Arc<MockShared>,
}

impl MockConnector {
    pub fn new(default: MockBehaviour) -> Self {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(MockShared {
                plan: Mutex::new(MockPlan {
                    default,
                    scripted: VecDeque::new(),
                    attempts: Vec::new(),
                }),
                remotes_tx,
                remotes_rx: tokio::sync::Mutex::new(remotes_rx),
            }),
        }
    }

    /// Accepts every open within 10ms
    pub fn accepting() -> Self {
        Self::new(MockBehaviour::Accept {
            after: Duration::from_millis(10),
        })
    }

    /// Behaviour for every open not covered by a scripted one
    pub fn set_default(&self, behaviour: MockBehaviour) {
        self.shared.plan.lock().default = behaviour;
    }

    /// Queue a one-shot behaviour for the next open
    pub fn push(&self, behaviour: MockBehaviour) {
        self.shared.plan.lock().scripted.push_back(behaviour);
    }

    /// Number of `open` calls so far
    pub fn attempts(&self) -> usize {
        self.shared.plan.lock().attempts.len()
    }

    /// When each `open` call started
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.shared.plan.lock().attempts.clone()
    }

    /// Wait for the next accepted connection
    pub async fn next_remote(&self) -> Option<MockRemote> {
        self.shared.remotes_rx.lock().await.recv().await
    }
}

impl Connector for MockConnector {
    fn open(&self, _url: &str) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let behaviour = {
            let mut plan = self.shared.plan.lock();
            plan.attempts.push(Instant::now());
            plan.scripted
                .pop_front()
                .unwrap_or_else(|| plan.default.clone())
        };
        let remotes = self.shared.remotes_tx.clone();

        async move {
            match behaviour {
                MockBehaviour::Accept { after } => {
                    tokio::time::sleep(after).await;
                    let (connection, remote) = MockRemote::pair();
                    let _ = remotes.send(remote);
                    Ok(connection)
                }
                MockBehaviour::AcceptWith { after, frames } => {
                    tokio::time::sleep(after).await;
                    let (connection, remote) = MockRemote::pair();
                    for frame in frames {
                        let _ = remote.to_client.send(frame);
                    }
                    let _ = remotes.send(remote);
                    Ok(connection)
                }
                MockBehaviour::Refuse => Err(TransportError::Connect("connection refused".to_string())),
                MockBehaviour::Hang => futures::future::pending().await,
            }
        }
        .boxed()
    }
}

/// Server side of a mock connection
pub struct MockRemote {
    to_client: mpsc::UnboundedSender<InboundFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockRemote {
    fn pair() -> (Connection, MockRemote) {
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        (
            Connection { outbound, inbound },
            MockRemote {
                to_client,
                from_client,
            },
        )
    }

    /// Deliver a raw text frame
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(InboundFrame::Text(text.into())).is_ok()
    }

    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.to_frame() {
            Ok(frame) => self.send_text(frame),
            Err(_) => false,
        }
    }

    /// Close the channel from the server side
    pub fn close(&self) {
        let _ = self.to_client.send(InboundFrame::Closed);
    }

    /// Fail the channel with a transport error
    pub fn fail(&self, reason: &str) {
        let _ = self
            .to_client
            .send(InboundFrame::Error(TransportError::Io(reason.to_string())));
    }

    /// Next frame the client sent; `None` once the client let go
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next already-sent frame, without waiting
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}
