//! Stream connection handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{self, ClientMessage};
use super::state::RelayState;
use crate::types::Envelope;

/// WebSocket upgrade handler for `/api/stream`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<RelayState>) {
    let mut rx = state.subscribe();
    let clients = state.client_joined();
    info!(clients, "stream client connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                let envelope = match result {
                    Ok(envelope) => envelope,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "stream client lagged");
                        events::lagged(missed)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !send_envelope(&mut socket, &envelope).await {
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, &mut socket).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "stream socket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let clients = state.client_left();
    info!(clients, "stream client disconnected");
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> bool {
    match envelope.to_frame() {
        Ok(frame) => socket.send(Message::Text(frame)).await.is_ok(),
        Err(e) => {
            warn!(kind = envelope.kind(), error = %e, "envelope not serializable");
            true
        }
    }
}

/// Returns false if the connection should be closed
async fn handle_client_message(msg: Message, socket: &mut WebSocket) -> bool {
    match msg {
        Message::Text(text) => {
            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping) => Some(events::pong()),
                Ok(ClientMessage::Reconnect) => Some(events::reconnect_ack()),
                Ok(ClientMessage::Other) => None,
                Err(e) => {
                    warn!(error = %e, "invalid message from stream client");
                    None
                }
            };
            match reply {
                Some(reply) => send_envelope(socket, &reply).await,
                None => true,
            }
        }
        Message::Binary(_) => true,
        Message::Ping(data) => socket.send(Message::Pong(data)).await.is_ok(),
        Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}
