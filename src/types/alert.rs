//! Alert notifications and their archived form

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AlertError;
use crate::utils::time::{iso8601, parse_iso8601};

/// Alert severity, ordered `Low < Moderate < High < Critical`
///
/// The backend's `WARNING` level decodes as `Moderate`, so its rank between
/// high and moderate is lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "LOW")]
    Low,
    #[serde(alias = "MODERATE", alias = "warning", alias = "WARNING")]
    Moderate,
    #[serde(alias = "HIGH")]
    High,
    #[serde(alias = "CRITICAL")]
    Critical,
}

impl Severity {
    /// Numeric rank, higher is more severe
    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Moderate => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

/// Remaining time until an alert's countdown target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Countdown {
    Remaining(chrono::Duration),
    /// The target has passed; the alert stays active until it expires
    Arrived,
}

/// An active alert notification
///
/// Alerts are never mutated after creation; an update replaces the alert
/// with the same id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "AlertWire")]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub affected_sectors: BTreeSet<String>,
    #[serde(serialize_with = "iso8601::serialize")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "iso8601::serialize")]
    pub expires_at: DateTime<Utc>,
    #[serde(
        serialize_with = "iso8601::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub countdown_target: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigations: Option<Vec<String>>,
}

impl Alert {
    /// Create an alert with the required fields; optional fields start empty
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, AlertError> {
        let alert = Self {
            id: id.into(),
            severity,
            title: title.into(),
            body: String::new(),
            affected_sectors: BTreeSet::new(),
            created_at,
            expires_at,
            countdown_target: None,
            confidence: None,
            mitigations: None,
        };
        alert.validate()?;
        Ok(alert)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_sectors<I, S>(mut self, sectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_sectors = sectors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_countdown(mut self, target: DateTime<Utc>) -> Self {
        self.countdown_target = Some(target);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self, AlertError> {
        self.confidence = Some(confidence);
        self.validate()?;
        Ok(self)
    }

    pub fn with_mitigations(mut self, mitigations: Vec<String>) -> Self {
        self.mitigations = Some(mitigations);
        self
    }

    /// Decode an alert from an envelope payload
    pub fn from_payload(payload: &Value) -> Result<Self, AlertError> {
        Ok(Alert::deserialize(payload)?)
    }

    /// Check the alert's invariants
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.id.is_empty() {
            return Err(AlertError::MissingId);
        }
        if self.expires_at <= self.created_at {
            return Err(AlertError::InvalidWindow { id: self.id.clone() });
        }
        if let Some(value) = self.confidence {
            if !(0.0..=100.0).contains(&value) {
                return Err(AlertError::InvalidConfidence {
                    id: self.id.clone(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left until `countdown_target`, if the alert carries one
    ///
    /// Arrival does not expire the alert; only `expires_at` does.
    pub fn countdown(&self, now: DateTime<Utc>) -> Option<Countdown> {
        self.countdown_target.map(|target| {
            if target > now {
                Countdown::Remaining(target - now)
            } else {
                Countdown::Arrived
            }
        })
    }
}

/// Accepts both the camelCase client shape and the backend's snake_case shape
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertWire {
    #[serde(default, alias = "alert_id")]
    id: String,
    severity: Severity,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "description")]
    body: String,
    #[serde(default, alias = "affected_sectors")]
    affected_sectors: BTreeSet<String>,
    #[serde(alias = "created_at", deserialize_with = "iso8601::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(alias = "expires_at", deserialize_with = "iso8601::deserialize")]
    expires_at: DateTime<Utc>,
    #[serde(
        default,
        alias = "countdown_target",
        deserialize_with = "iso8601::option::deserialize"
    )]
    countdown_target: Option<DateTime<Utc>>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "mitigation_recommendations")]
    mitigations: Option<Vec<String>>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl TryFrom<AlertWire> for Alert {
    type Error = AlertError;

    fn try_from(wire: AlertWire) -> Result<Self, Self::Error> {
        let confidence = wire.confidence.or_else(|| {
            wire.metadata
                .get("confidence_percent")
                .and_then(Value::as_f64)
        });
        let countdown_target = wire.countdown_target.or_else(|| {
            wire.metadata
                .get("arrival_time_lower")
                .and_then(Value::as_str)
                .and_then(parse_iso8601)
        });

        let alert = Alert {
            id: wire.id,
            severity: wire.severity,
            title: wire.title,
            body: wire.body,
            affected_sectors: wire.affected_sectors,
            created_at: wire.created_at,
            expires_at: wire.expires_at,
            countdown_target,
            confidence,
            mitigations: wire.mitigations,
        };
        alert.validate()?;
        Ok(alert)
    }
}

/// An expired alert, stripped to its display fields
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryEntry {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub affected_sectors: BTreeSet<String>,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub expires_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub archived_at: DateTime<Utc>,
}

impl AlertHistoryEntry {
    pub fn archive(alert: Alert, archived_at: DateTime<Utc>) -> Self {
        Self {
            id: alert.id,
            severity: alert.severity,
            title: alert.title,
            body: alert.body,
            affected_sectors: alert.affected_sectors,
            created_at: alert.created_at,
            expires_at: alert.expires_at,
            archived_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Moderate);
        assert!(Severity::Moderate > Severity::Low);
        assert_eq!(Severity::Critical.rank(), 4);
    }

    #[test]
    fn test_decode_client_shape() {
        let payload = json!({
            "id": "a1",
            "severity": "critical",
            "title": "X-class flare",
            "body": "HF blackout expected",
            "affectedSectors": ["aviation", "telecommunications"],
            "createdAt": "2024-05-10T16:00:00Z",
            "expiresAt": "2024-05-10T18:00:00Z",
            "countdownTarget": "2024-05-10T17:00:00Z",
            "confidence": 85.0,
            "mitigations": ["Reroute polar flights"]
        });

        let alert = Alert::from_payload(&payload).unwrap();
        assert_eq!(alert.id, "a1");
        assert_eq!(alert.severity, Severity::Critical);
        assert!(alert.affected_sectors.contains("aviation"));
        assert_eq!(alert.confidence, Some(85.0));
        assert_eq!(alert.countdown_target, Some(t0() + Duration::hours(1)));
        assert_eq!(alert.mitigations.as_deref(), Some(&["Reroute polar flights".to_string()][..]));
    }

    #[test]
    fn test_decode_backend_shape() {
        let payload = json!({
            "alert_id": "f-123",
            "alert_type": "FORECAST",
            "severity": "WARNING",
            "title": "CME IMPACT FORECAST",
            "description": "A CME is expected",
            "affected_sectors": ["gps", "power_grid"],
            "created_at": "2024-05-10T16:00:00",
            "expires_at": "2024-05-10T18:00:00",
            "mitigation_recommendations": ["Monitor GIC levels"],
            "metadata": {
                "confidence_percent": 70.0,
                "arrival_time_lower": "2024-05-11T10:00:00"
            }
        });

        let alert = Alert::from_payload(&payload).unwrap();
        assert_eq!(alert.id, "f-123");
        assert_eq!(alert.severity, Severity::Moderate);
        assert!(alert.severity < Severity::High);
        assert_eq!(alert.body, "A CME is expected");
        assert_eq!(alert.confidence, Some(70.0));
        assert!(alert.countdown_target.is_some());
    }

    #[test]
    fn test_decode_rejects_inverted_window() {
        let payload = json!({
            "id": "bad",
            "severity": "low",
            "createdAt": "2024-05-10T18:00:00Z",
            "expiresAt": "2024-05-10T16:00:00Z"
        });
        assert!(Alert::from_payload(&payload).is_err());

        let err = Alert::new("bad", Severity::Low, "t", t0(), t0()).unwrap_err();
        assert!(matches!(err, AlertError::InvalidWindow { .. }));
    }

    #[test]
    fn test_confidence_bounds() {
        let alert = Alert::new("a", Severity::Low, "t", t0(), t0() + Duration::hours(2)).unwrap();
        assert!(alert.clone().with_confidence(100.0).is_ok());
        assert!(matches!(
            alert.with_confidence(120.0),
            Err(AlertError::InvalidConfidence { .. })
        ));
    }

    #[test]
    fn test_countdown_arrival_does_not_expire() {
        let alert = Alert::new("a", Severity::High, "t", t0(), t0() + Duration::hours(2))
            .unwrap()
            .with_countdown(t0() + Duration::minutes(30));

        assert_eq!(alert.countdown(t0()), Some(Countdown::Remaining(Duration::minutes(30))));

        let later = t0() + Duration::minutes(45);
        assert_eq!(alert.countdown(later), Some(Countdown::Arrived));
        assert!(!alert.is_expired(later));
        assert!(alert.is_expired(t0() + Duration::hours(2)));
    }

    #[test]
    fn test_serialize_camel_case() {
        let alert = Alert::new("a1", Severity::Critical, "t", t0(), t0() + Duration::hours(2))
            .unwrap()
            .with_sectors(["gps"]);
        let value = serde_json::to_value(&alert).unwrap();

        assert_eq!(value["affectedSectors"], json!(["gps"]));
        assert_eq!(value["createdAt"], "2024-05-10T16:00:00.000Z");
        assert!(value.get("confidence").is_none());

        let decoded: Alert = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, alert);
    }
}
