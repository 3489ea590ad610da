//! Stream relay: the server side of the live-update wire contract

pub mod http;
pub mod websocket;

pub use http::{create_router, serve};
pub use websocket::RelayState;
