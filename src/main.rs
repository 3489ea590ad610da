//! AstroSense sync binary
//!
//! `watch` follows a live stream and logs released updates and alert changes;
//! `relay` serves a stream fed with newline-delimited envelopes from stdin.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use astrosense_sync::api::{self, RelayState};
use astrosense_sync::logging::init_subscriber;
use astrosense_sync::{Envelope, LiveSync, SyncConfig};

#[derive(Debug, Parser)]
#[command(name = "astrosense-sync", version, about = "AstroSense live synchronization core")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info", env = "ASTROSENSE_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to a stream and log what it delivers
    Watch {
        /// Stream endpoint; defaults to ASTROSENSE_ENDPOINT_URL or the local relay
        #[arg(long)]
        url: Option<String>,

        /// Minimum spacing between released updates
        #[arg(long)]
        animation_ms: Option<u64>,
    },
    /// Serve a stream, broadcasting envelopes read from stdin
    Relay {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level);

    match cli.command {
        Command::Watch { url, animation_ms } => watch(url, animation_ms).await,
        Command::Relay { bind } => relay(bind).await,
    }
}

async fn watch(url: Option<String>, animation_ms: Option<u64>) -> Result<(), Box<dyn Error>> {
    let mut config = SyncConfig::from_env()?;
    if let Some(url) = url {
        config.endpoint_url = url;
    }
    if let Some(ms) = animation_ms {
        config.animation_duration_ms = ms;
    }

    let sync = LiveSync::new(config)?;
    sync.coordinator().subscribe(|update: &Envelope| {
        info!(kind = update.kind(), timestamp = %update.timestamp(), data = %update.payload(), "update released");
        Ok(())
    });
    sync.on_alerts_changed(|alerts| {
        info!(active = alerts.len(), "active alerts changed");
        for alert in alerts {
            info!(alert_id = %alert.id, severity = ?alert.severity, title = %alert.title, "active alert");
        }
        Ok(())
    });
    sync.client().on("connection", |event: &Envelope| {
        info!(status = %event.payload()["status"], "connection status");
        Ok(())
    });

    sync.start();
    if let Err(e) = sync.connect().await {
        warn!(error = %e, "initial connection failed, retrying in background");
    }

    tokio::signal::ctrl_c().await?;
    sync.shutdown();
    Ok(())
}

async fn relay(bind: SocketAddr) -> Result<(), Box<dyn Error>> {
    let state = Arc::new(RelayState::default());
    let listener = TcpListener::bind(bind).await?;
    let server = tokio::spawn(api::serve(listener, state.clone()));

    let feed = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match Envelope::parse(&line) {
                    Ok(envelope) => {
                        state.broadcast(envelope);
                    }
                    Err(e) => warn!(error = %e, "skipping invalid envelope on stdin"),
                },
                Ok(None) => {
                    info!("stdin closed, relay keeps serving");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "reading stdin failed");
                    return;
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    feed.abort();
    server.abort();
    info!("relay stopped");
    Ok(())
}
