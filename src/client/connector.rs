//! Transport seam: opening the underlying channel
//!
//! The client never touches a socket directly. A [`Connector`] opens a
//! [`Connection`], which is a pair of in-process channels; the WebSocket
//! implementation pumps frames between those channels and the socket.

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::TransportError;

/// A frame (or terminal condition) delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    /// The remote end closed the channel
    Closed,
    /// The channel failed; no further frames follow
    Error(TransportError),
}

/// An open channel
///
/// Dropping `outbound` asks the transport to close the channel. The channel
/// is considered closed once `inbound` yields `Closed`, `Error` or `None`.
#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Opens channels to an endpoint
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> BoxFuture<'static, Result<Connection, TransportError>>;
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &str) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let url = url.to_string();
        async move {
            let (socket, response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            debug!(%url, status = %response.status(), "websocket handshake complete");

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            tokio::spawn(pump(socket, outbound_rx, inbound_tx));

            Ok(Connection {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        }
        .boxed()
    }
}

/// Move frames between the socket and the connection channels until either
/// side goes away
async fn pump(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(error = %e, "websocket send failed");
                        let _ = inbound.send(InboundFrame::Error(TransportError::Io(e.to_string())));
                        return;
                    }
                }
                None => {
                    // Client side let go of the connection
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    return;
                }
            },

            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(InboundFrame::Text(text)).is_err() {
                        let _ = sink.close().await;
                        return;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = inbound.send(InboundFrame::Closed);
                    return;
                }
                Some(Ok(_)) => {} // Binary and pong frames carry nothing for us
                Some(Err(e)) => {
                    let _ = inbound.send(InboundFrame::Error(TransportError::Io(e.to_string())));
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ws_connector_reports_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnector.open(&format!("ws://{addr}/api/stream")).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
