//! Tailgating incidents -- data model, alert policy and the incident store.

pub mod policy;
pub mod store;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::PersistError;

pub use self::store::IncidentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("incident {0} not found")]
    NotFound(u64),

    #[error("failed to persist incidents: {0}")]
    Persistence(#[from] PersistError),

    #[error("incident {id} has a malformed timestamp: {timestamp:?}")]
    MalformedTimestamp { id: u64, timestamp: String },
}

/// Where an incident came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentKind {
    /// Person count reported by a client (gate terminal, browser monitor).
    #[serde(rename = "MANUAL_REPORT", alias = "TAILGATING")]
    ManualReport,
    /// Person count produced by the human detector.
    #[serde(rename = "DETECTOR_REPORT", alias = "TAILGATING_YOLO")]
    DetectorReport,
}

/// Incident lifecycle state. Only `Detected` is ever assigned; the other
/// two are reserved and only read by statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    #[default]
    Detected,
    Active,
    Resolved,
}

/// A recorded tailgating incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: u64,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: IncidentKind,
    pub persons: u32,
    pub location: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_scores: Option<Vec<f64>>,
}

/// An incident the alert policy decided to record, before the store
/// assigns its ID.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentCandidate {
    pub timestamp: String,
    pub kind: IncidentKind,
    pub persons: u32,
    pub location: serde_json::Map<String, serde_json::Value>,
    pub status: IncidentStatus,
    pub detection_method: Option<String>,
    pub confidence_scores: Option<Vec<f64>>,
}

impl IncidentCandidate {
    pub(crate) fn into_incident(self, id: u64) -> Incident {
        Incident {
            id,
            timestamp: self.timestamp,
            kind: self.kind,
            persons: self.persons,
            location: self.location,
            status: self.status,
            detection_method: self.detection_method,
            confidence_scores: self.confidence_scores,
        }
    }
}

/// Summary counters over the whole incident log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncidentStats {
    pub total: usize,
    pub active: usize,
    pub today: usize,
    /// IDs whose timestamp could not be parsed; excluded from `today`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub malformed: Vec<u64>,
}

/// Current local time in the format used for generated incident timestamps.
pub fn now_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse an ISO-8601 timestamp into local wall-clock time.
///
/// Accepts RFC 3339 with an offset, naive date-times (`T` or space separator,
/// optional fraction) and bare dates.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
