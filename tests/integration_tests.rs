//! End-to-end tests: the WebSocket client against the crate's own relay

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use astrosense_sync::api::{self, RelayState};
use astrosense_sync::utils::SystemClock;
use astrosense_sync::{ConnectionState, Envelope, LiveSync, SyncClient, SyncConfig, WsConnector};

struct TestRelay {
    state: Arc<RelayState>,
    url: String,
    server: JoinHandle<std::io::Result<()>>,
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn start_relay() -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(RelayState::default());
    let server = tokio::spawn(api::serve(listener, state.clone()));
    TestRelay {
        state,
        url: format!("ws://{addr}/api/stream"),
        server,
    }
}

/// Poll `condition` every 10ms for up to 5s
async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn config_for(relay: &TestRelay) -> SyncConfig {
    SyncConfig {
        animation_duration_ms: 50,
        ..SyncConfig::new(relay.url.clone())
    }
}

#[tokio::test]
async fn test_alert_and_update_flow_through_relay() {
    let relay = start_relay().await;
    let sync = LiveSync::with_parts(config_for(&relay), WsConnector, Arc::new(SystemClock)).unwrap();

    let (tx, mut released) = mpsc::unbounded_channel();
    sync.coordinator().subscribe(move |update: &Envelope| {
        let _ = tx.send(update.clone());
        Ok(())
    });
    sync.start();
    sync.connect().await.unwrap();
    assert_eq!(sync.client().get_status(), ConnectionState::Connected);
    assert!(eventually(|| relay.state.client_count() == 1).await);

    let now = Utc::now();
    relay.state.broadcast(Envelope::new(
        "alert",
        json!({
            "alert_id": "a1",
            "severity": "CRITICAL",
            "title": "G4 geomagnetic storm",
            "description": "Kp expected to reach 8",
            "affected_sectors": ["power_grid", "gps"],
            "created_at": now.to_rfc3339(),
            "expires_at": (now + chrono::Duration::hours(1)).to_rfc3339(),
            "mitigation_recommendations": ["Reduce transformer load"],
        }),
    ));
    relay.state.broadcast(Envelope::new("space_weather_update", json!({ "kp_index": 8 })));

    assert!(eventually(|| sync.list_active().len() == 1).await);
    let active = sync.list_active();
    assert_eq!(active[0].id, "a1");
    assert!(active[0].affected_sectors.contains("gps"));

    let update = tokio::time::timeout(Duration::from_secs(5), released.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.kind(), "space_weather_update");
    assert_eq!(update.payload()["kp_index"], 8);

    sync.shutdown();
    assert!(eventually(|| relay.state.client_count() == 0).await);
}

#[tokio::test]
async fn test_heartbeat_answered_with_pong() {
    let relay = start_relay().await;
    let config = SyncConfig {
        heartbeat_interval_ms: 50,
        ..config_for(&relay)
    };
    let client = SyncClient::new(config);

    let (tx, mut pongs) = mpsc::unbounded_channel();
    client.on("pong", move |envelope: &Envelope| {
        let _ = tx.send(envelope.timestamp());
        Ok(())
    });
    client.connect().await.unwrap();

    let pong = tokio::time::timeout(Duration::from_secs(5), pongs.recv()).await.unwrap();
    assert!(pong.is_some());
    client.disconnect();
}

#[tokio::test]
async fn test_reconnect_request_acknowledged() {
    let relay = start_relay().await;
    let client = SyncClient::new(config_for(&relay));

    let (tx, mut acks) = mpsc::unbounded_channel();
    client.on("reconnect_ack", move |envelope: &Envelope| {
        let _ = tx.send(envelope.extra()["message"].clone());
        Ok(())
    });
    client.connect().await.unwrap();
    assert!(client.send(&json!({ "type": "reconnect" })));

    let message = tokio::time::timeout(Duration::from_secs(5), acks.recv()).await.unwrap();
    assert_eq!(message, Some(json!("Already connected")));
    client.disconnect();
}

#[tokio::test]
async fn test_relay_ignores_malformed_client_frames() {
    let relay = start_relay().await;
    let (mut socket, _) = tokio_tungstenite::connect_async(relay.url.as_str()).await.unwrap();

    socket.send(Message::Text("{not json".to_string())).await.unwrap();
    socket.send(Message::Text(r#"{"type":"ping"}"#.to_string())).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let envelope = Envelope::parse(reply.to_text().unwrap()).unwrap();
    assert_eq!(envelope.kind(), "pong");
}

#[tokio::test]
async fn test_connect_to_missing_relay_fails_and_errors() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = SyncClient::new(SyncConfig::new(format!("ws://{addr}/api/stream")));
    assert!(client.connect().await.is_err());
    assert_eq!(client.get_status(), ConnectionState::Errored);
    client.disconnect();
    assert_eq!(client.get_status(), ConnectionState::Disconnected);
}
