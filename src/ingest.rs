//! Ingestion: the operations the HTTP layer and the CLI call.
//!
//! Store calls run on the blocking pool because every mutation writes the
//! snapshot synchronously. Detector calls are awaited before the store is
//! touched, so a slow detector never holds the store lock.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::detect::{decode_base64_image, DetectError, Detection, DetectionResult, Detector};
use crate::incident::policy::{self, CaptureMethod, Channel};
use crate::incident::{parse_timestamp, Incident, IncidentStats, IncidentStore, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("{0}")]
    Validation(String),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result of running the detector on one image.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub result: DetectionResult,
    pub tailgating_alert: bool,
    pub incident: Option<Incident>,
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<IncidentStore>,
    detector: Arc<dyn Detector>,
    source_label: String,
}

impl Ingestor {
    pub fn new(
        store: Arc<IncidentStore>,
        detector: Arc<dyn Detector>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            store,
            detector,
            source_label: source_label.into(),
        }
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T, IngestError>
    where
        T: Send + 'static,
        F: FnOnce(&IncidentStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
    }

    /// Record a client-reported tailgating event.
    pub async fn record_manual(
        &self,
        persons: u32,
        location: Map<String, Value>,
        timestamp: Option<String>,
    ) -> Result<Incident, IngestError> {
        if persons == 0 {
            return Err(IngestError::Validation("persons must be at least 1".into()));
        }
        if let Some(ts) = &timestamp {
            if parse_timestamp(ts).is_none() {
                return Err(IngestError::Validation(format!(
                    "timestamp {:?} is not an ISO-8601 date-time",
                    ts
                )));
            }
        }

        let candidate = policy::evaluate_manual(persons, location, timestamp);
        let incident = self.with_store(move |s| s.append(candidate)).await?;
        warn!(id = incident.id, persons, "Tailgating reported");
        Ok(incident)
    }

    /// Record detector output if it crosses the tailgating threshold.
    pub async fn record_detection(
        &self,
        person_count: u32,
        detections: Vec<Detection>,
        channel: Channel,
    ) -> Result<Option<Incident>, IngestError> {
        let Some(candidate) = policy::evaluate_detector(person_count, &detections, &channel) else {
            return Ok(None);
        };

        let incident = self.with_store(move |s| s.append(candidate)).await?;
        warn!(
            id = incident.id,
            persons = person_count,
            source = %channel.source,
            method = channel.method.as_str(),
            "Tailgating detected"
        );
        Ok(Some(incident))
    }

    /// Run the detector on `image` and record an incident when it fires.
    pub async fn detect_and_record(
        &self,
        image: Vec<u8>,
        method: CaptureMethod,
    ) -> Result<DetectionOutcome, IngestError> {
        let result = self.detector.detect(image).await?;
        info!(persons = result.person_count, method = method.as_str(), "Detection complete");

        let channel = Channel {
            source: self.source_label.clone(),
            method,
            model: self.detector.model_name().to_string(),
        };
        let incident = self
            .record_detection(result.person_count, result.detections.clone(), channel)
            .await?;

        Ok(DetectionOutcome {
            tailgating_alert: policy::is_tailgating(result.person_count),
            result,
            incident,
        })
    }

    /// Decode a base64 frame (optionally a data URL) and run it through the detector.
    pub async fn detect_base64(&self, payload: &str) -> Result<DetectionOutcome, IngestError> {
        let image = decode_base64_image(payload)?;
        self.detect_and_record(image, CaptureMethod::Base64Stream).await
    }

    pub async fn list_incidents(&self) -> Result<Vec<Incident>, IngestError> {
        self.with_store(|s| Ok(s.list_all())).await
    }

    pub async fn get_incident(&self, id: u64) -> Result<Incident, IngestError> {
        self.with_store(move |s| s.get(id)).await
    }

    pub async fn delete_incident(&self, id: u64) -> Result<(), IngestError> {
        self.with_store(move |s| s.delete(id)).await
    }

    pub async fn get_stats(&self) -> Result<IncidentStats, IngestError> {
        self.with_store(|s| Ok(s.stats())).await
    }

    pub async fn incident_count(&self) -> Result<usize, IngestError> {
        self.with_store(|s| Ok(s.len())).await
    }

    pub async fn model_info(&self) -> Result<Value, IngestError> {
        Ok(self.detector.model_info().await?)
    }

    pub async fn load_model(&self) -> Result<(), IngestError> {
        self.detector.load_model().await?;
        info!(model = self.detector.model_name(), "Detector model loaded");
        Ok(())
    }
}
