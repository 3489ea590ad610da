//! Configuration for the synchronization core
//!
//! Every option has a default; `from_env` overlays `ASTROSENSE_*` variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "ASTROSENSE_";

/// Options recognised by the client, coordinator and ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub endpoint_url: String,
    pub connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect_floor_ms: u64,
    pub reconnect_ceiling_ms: u64,
    pub max_reconnect_attempts: u32,
    pub queue_capacity: usize,
    pub animation_duration_ms: u64,
    pub alert_history_capacity: usize,
    pub sweep_interval_ms: u64,
    /// Message kinds queued with high priority
    pub high_priority_kinds: Vec<String>,
    /// Discard queued updates older than this at release time
    pub stale_after_ms: Option<u64>,
    /// Message kind routed to the alert ledger
    pub alert_kind: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "ws://127.0.0.1:8000/api/stream".to_string(),
            connect_timeout_ms: 2_000,
            heartbeat_interval_ms: 30_000,
            reconnect_floor_ms: 1_000,
            reconnect_ceiling_ms: 30_000,
            max_reconnect_attempts: 10,
            queue_capacity: 20,
            animation_duration_ms: 300,
            alert_history_capacity: 20,
            sweep_interval_ms: 1_000,
            high_priority_kinds: vec!["system_status".to_string()],
            stale_after_ms: None,
            alert_kind: "alert".to_string(),
        }
    }
}

impl SyncConfig {
    /// Create config for the given endpoint with default settings
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `ASTROSENSE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by full variable name
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(url) = var("ENDPOINT_URL") {
            config.endpoint_url = url;
        }
        overlay(&var, "CONNECT_TIMEOUT_MS", &mut config.connect_timeout_ms)?;
        overlay(&var, "HEARTBEAT_INTERVAL_MS", &mut config.heartbeat_interval_ms)?;
        overlay(&var, "RECONNECT_FLOOR_MS", &mut config.reconnect_floor_ms)?;
        overlay(&var, "RECONNECT_CEILING_MS", &mut config.reconnect_ceiling_ms)?;
        overlay(&var, "MAX_RECONNECT_ATTEMPTS", &mut config.max_reconnect_attempts)?;
        overlay(&var, "QUEUE_CAPACITY", &mut config.queue_capacity)?;
        overlay(&var, "ANIMATION_DURATION_MS", &mut config.animation_duration_ms)?;
        overlay(&var, "ALERT_HISTORY_CAPACITY", &mut config.alert_history_capacity)?;
        overlay(&var, "SWEEP_INTERVAL_MS", &mut config.sweep_interval_ms)?;

        if let Some(raw) = var("STALE_AFTER_MS") {
            let value = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("STALE_AFTER_MS", &raw))?;
            config.stale_after_ms = Some(value);
        }
        if let Some(kinds) = var("HIGH_PRIORITY_KINDS") {
            config.high_priority_kinds = kinds
                .split(',')
                .map(str::trim)
                .filter(|kind| !kind.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(kind) = var("ALERT_KIND") {
            config.alert_kind = kind;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the components cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("CONNECT_TIMEOUT_MS", self.connect_timeout_ms),
            ("HEARTBEAT_INTERVAL_MS", self.heartbeat_interval_ms),
            ("RECONNECT_FLOOR_MS", self.reconnect_floor_ms),
            ("SWEEP_INTERVAL_MS", self.sweep_interval_ms),
            ("QUEUE_CAPACITY", self.queue_capacity as u64),
            ("ALERT_HISTORY_CAPACITY", self.alert_history_capacity as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid(key, value));
            }
        }
        if self.reconnect_floor_ms > self.reconnect_ceiling_ms {
            return Err(ConfigError::invalid(
                "RECONNECT_CEILING_MS",
                self.reconnect_ceiling_ms,
            ));
        }
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::invalid("ENDPOINT_URL", &self.endpoint_url));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_floor(&self) -> Duration {
        Duration::from_millis(self.reconnect_floor_ms)
    }

    pub fn reconnect_ceiling(&self) -> Duration {
        Duration::from_millis(self.reconnect_ceiling_ms)
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_ms.map(Duration::from_millis)
    }
}

fn overlay<T, F>(var: &F, name: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(name) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::invalid(name, &raw))?;
    }
    Ok(())
}
