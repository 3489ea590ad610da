//! AstroSense live synchronization core
//!
//! Keeps a dashboard in step with a space-weather backend over one persistent
//! WebSocket stream.
//!
//! # Components
//!
//! - [`SyncClient`]: reconnecting stream client with heartbeat, bounded
//!   exponential backoff and a per-kind handler registry
//! - [`UpdateCoordinator`]: bounded two-tier queue releasing updates no faster
//!   than the UI can animate, and never mid-gesture
//! - [`AlertLedger`]: active alerts ordered by severity then recency, swept into
//!   a bounded history when they expire
//! - [`LiveSync`]: wires the three together
//! - [`api`]: an axum relay serving the same wire contract, for local use and
//!   end-to-end tests
//!
//! # Example
//!
//! ```no_run
//! use astrosense_sync::{LiveSync, SyncConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sync = LiveSync::new(SyncConfig::new("ws://127.0.0.1:8000/api/stream"))?;
//! sync.coordinator().subscribe(|update| {
//!     println!("{} at {}", update.kind(), update.timestamp());
//!     Ok(())
//! });
//! sync.start();
//! sync.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod sync;
pub mod types;
pub mod utils;

pub use alerts::{AlertLedger, SharedLedger};
pub use client::{Connector, SyncClient, WsConnector};
pub use config::SyncConfig;
pub use coordinator::{EnqueueOutcome, QueueStatus, UpdateCoordinator};
pub use error::{AlertError, ClientError, ClientResult, ConfigError, EnvelopeError, TransportError};
pub use sync::LiveSync;
pub use types::{
    Alert, AlertHistoryEntry, ConnectionState, ConnectionStatus, Countdown, Envelope, Priority,
    QueuedUpdate, Severity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
