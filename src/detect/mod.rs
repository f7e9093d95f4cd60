//! Human detector adapter.
//!
//! The detector is an external collaborator: TailGuard hands it an image
//! and gets back a person count and per-person detections. Failures are
//! passed through verbatim and never retried.

pub mod http;

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::http::HttpDetector;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The detector ran and reported a failure.
    #[error("{0}")]
    Failed(String),

    #[error("invalid image payload: {0}")]
    InvalidImage(String),

    #[error("detector unreachable: {0}")]
    Transport(String),

    #[error("no detector configured")]
    Unavailable,
}

/// Axis-aligned bounding box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// One detected person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f64,
}

/// Successful detector output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub person_count: u32,
    pub detections: Vec<Detection>,
    /// Image dimensions as reported by the detector (height, width, channels).
    pub image_shape: Vec<u32>,
}

/// Detector response body, before the success flag is checked.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionResponse {
    pub success: bool,
    #[serde(default)]
    pub person_count: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub image_shape: Vec<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DetectionResponse {
    pub fn into_result(self) -> Result<DetectionResult, DetectError> {
        if !self.success {
            return Err(DetectError::Failed(
                self.error.unwrap_or_else(|| "Detection failed".to_string()),
            ));
        }
        Ok(DetectionResult {
            person_count: self.person_count,
            detections: self.detections,
            image_shape: self.image_shape,
        })
    }
}

/// Something that can count people in an image.
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// Model identifier recorded on detector incidents.
    fn model_name(&self) -> &str;

    async fn detect(&self, image: Vec<u8>) -> Result<DetectionResult, DetectError>;

    async fn model_info(&self) -> Result<serde_json::Value, DetectError>;

    /// Ask the detector to load (warm up) its model.
    async fn load_model(&self) -> Result<(), DetectError>;
}

/// Stand-in used when no detector is configured.
pub struct UnavailableDetector {
    model: String,
}

impl UnavailableDetector {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait::async_trait]
impl Detector for UnavailableDetector {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn detect(&self, _image: Vec<u8>) -> Result<DetectionResult, DetectError> {
        Err(DetectError::Unavailable)
    }

    async fn model_info(&self) -> Result<serde_json::Value, DetectError> {
        Err(DetectError::Unavailable)
    }

    async fn load_model(&self) -> Result<(), DetectError> {
        Err(DetectError::Unavailable)
    }
}

/// Decode a base64 image, with or without a `data:<mime>;base64,` prefix.
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, DetectError> {
    let payload = payload.trim();
    let encoded = match payload.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| DetectError::InvalidImage("data URL without payload".into()))?,
        None => payload,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| DetectError::InvalidImage(e.to_string()))?;
    if bytes.is_empty() {
        return Err(DetectError::InvalidImage("empty image".into()));
    }
    Ok(bytes)
}
