//! Active alerts and the bounded history of expired ones

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::AlertError;
use crate::types::{Alert, AlertHistoryEntry};

/// Default history ring size
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Store of active alerts keyed by id
///
/// Ordering of `list_active` is a pure function of the stored fields, never
/// of insertion order.
#[derive(Debug)]
pub struct AlertLedger {
    active: BTreeMap<String, Alert>,
    /// Newest first
    history: VecDeque<AlertHistoryEntry>,
    history_capacity: usize,
}

impl Default for AlertLedger {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl AlertLedger {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            active: BTreeMap::new(),
            history: VecDeque::with_capacity(history_capacity),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Insert a new alert; an id already active is rejected, not merged
    pub fn add_alert(&mut self, alert: Alert) -> Result<(), AlertError> {
        alert.validate()?;
        if self.active.contains_key(&alert.id) {
            return Err(AlertError::Duplicate { id: alert.id });
        }
        info!(alert_id = %alert.id, severity = ?alert.severity, "alert added");
        self.active.insert(alert.id.clone(), alert);
        Ok(())
    }

    /// Insert or replace the alert with the same id, returning the previous one
    pub fn replace_alert(&mut self, alert: Alert) -> Result<Option<Alert>, AlertError> {
        alert.validate()?;
        debug!(alert_id = %alert.id, "alert replaced");
        Ok(self.active.insert(alert.id.clone(), alert))
    }

    /// Dismiss an alert; dismissed alerts do not enter the history
    pub fn remove_alert(&mut self, id: &str) -> Option<Alert> {
        let removed = self.active.remove(id);
        if removed.is_some() {
            debug!(alert_id = id, "alert dismissed");
        }
        removed
    }

    /// Move every alert with `expires_at <= now` into the history
    ///
    /// Returns the ids moved, in the order they were archived. The most
    /// recently expired alert ends up at the head of the history.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<Alert> = Vec::new();
        self.active.retain(|_, alert| {
            if alert.is_expired(now) {
                expired.push(alert.clone());
                false
            } else {
                true
            }
        });
        if expired.is_empty() {
            return Vec::new();
        }

        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));
        let ids: Vec<String> = expired.iter().map(|alert| alert.id.clone()).collect();
        for alert in expired {
            self.history.push_front(AlertHistoryEntry::archive(alert, now));
        }
        self.history.truncate(self.history_capacity);

        info!(count = ids.len(), "expired alerts archived");
        ids
    }

    /// Active alerts, most severe first, then newest first
    pub fn list_active(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.active.values().cloned().collect();
        alerts.sort_by(|a, b| {
            b.severity
                .rank()
                .cmp(&a.severity.rank())
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        alerts
    }

    /// Archived alerts, newest first
    pub fn list_history(&self) -> Vec<AlertHistoryEntry> {
        self.history.iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.active.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
