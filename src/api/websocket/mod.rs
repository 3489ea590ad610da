//! WebSocket stream relay
//!
//! Serves `/api/stream`: every envelope broadcast through [`RelayState`] is
//! pushed to all connected clients as a text frame. Clients may send
//! `ping` (answered with `pong`) and `reconnect` (answered with
//! `reconnect_ack`).

pub mod events;
pub mod handler;
pub mod state;

pub use state::RelayState;
