//! Alert policy: decide whether a signal becomes an incident.
//!
//! Everything here is pure. Timestamps default to the current local time,
//! but nothing touches the store or the detector.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{now_timestamp, IncidentCandidate, IncidentKind, IncidentStatus};
use crate::detect::Detection;

/// Two or more people crossing as one access event is tailgating.
pub const TAILGATING_THRESHOLD: u32 = 2;

/// How the image reached the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    ImageUpload,
    Base64Stream,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::ImageUpload => "image_upload",
            CaptureMethod::Base64Stream => "base64_stream",
        }
    }
}

/// Provenance of a detector signal.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Label recorded as `location.source`.
    pub source: String,
    pub method: CaptureMethod,
    /// Model identifier recorded as `detection_method`.
    pub model: String,
}

pub fn is_tailgating(person_count: u32) -> bool {
    person_count >= TAILGATING_THRESHOLD
}

/// Manual reports are trusted as-is.
pub fn evaluate_manual(
    persons: u32,
    location: Map<String, Value>,
    timestamp: Option<String>,
) -> IncidentCandidate {
    IncidentCandidate {
        timestamp: timestamp.unwrap_or_else(now_timestamp),
        kind: IncidentKind::ManualReport,
        persons,
        location,
        status: IncidentStatus::Detected,
        detection_method: None,
        confidence_scores: None,
    }
}

/// Returns a candidate only when the detector saw enough people to count
/// as tailgating.
pub fn evaluate_detector(
    person_count: u32,
    detections: &[Detection],
    channel: &Channel,
) -> Option<IncidentCandidate> {
    if !is_tailgating(person_count) {
        return None;
    }

    let mut location = Map::new();
    location.insert("source".into(), Value::String(channel.source.clone()));
    location.insert("method".into(), Value::String(channel.method.as_str().into()));

    Some(IncidentCandidate {
        timestamp: now_timestamp(),
        kind: IncidentKind::DetectorReport,
        persons: person_count,
        location,
        status: IncidentStatus::Detected,
        detection_method: Some(channel.model.clone()),
        confidence_scores: Some(detections.iter().map(|d| d.confidence).collect()),
    })
}
