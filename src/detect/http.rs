//! Detector adapter over an external detection service.
//!
//! Endpoints on the service:
//! - `POST {base}/detect` multipart, part `file` holds the image
//! - `GET  {base}/model-info`
//! - `POST {base}/load-model`

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use super::{DetectError, DetectionResponse, DetectionResult, Detector};

pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpDetector {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DetectError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Read the body of a response, turning non-2xx statuses into failures
    /// that carry the service's own message.
    async fn json_body(resp: reqwest::Response) -> Result<serde_json::Value, DetectError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .map_err(|e| DetectError::Transport(e.to_string()))?;
            return Err(DetectError::Failed(failure_message(status, &text)));
        }

        resp.json()
            .await
            .map_err(|e| DetectError::Transport(e.to_string()))
    }
}

/// Message for a non-2xx detector reply: the `error` or `detail` field of a
/// JSON body, else the raw body text, else the status line.
fn failure_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = json
            .get("error")
            .or_else(|| json.get("detail"))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("detector returned {}", status)
    } else {
        body.to_string()
    }
}

#[async_trait::async_trait]
impl Detector for HttpDetector {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn detect(&self, image: Vec<u8>) -> Result<DetectionResult, DetectError> {
        let url = format!("{}/detect", self.base_url);
        let size = image.len();

        let part = Part::bytes(image)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| DetectError::InvalidImage(e.to_string()))?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(%url, error = %e, "Detector request failed");
                DetectError::Transport(e.to_string())
            })?;

        let body = Self::json_body(resp).await?;
        let parsed: DetectionResponse = serde_json::from_value(body)
            .map_err(|e| DetectError::Transport(format!("unexpected detector response: {}", e)))?;
        let result = parsed.into_result()?;

        debug!(bytes = size, persons = result.person_count, "Detector response");
        Ok(result)
    }

    async fn model_info(&self) -> Result<serde_json::Value, DetectError> {
        let url = format!("{}/model-info", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DetectError::Transport(e.to_string()))?;
        Self::json_body(resp).await
    }

    async fn load_model(&self) -> Result<(), DetectError> {
        let url = format!("{}/load-model", self.base_url);
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| DetectError::Transport(e.to_string()))?;
        Self::json_body(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let detector =
            HttpDetector::new("http://127.0.0.1:9000/", "YOLOv8", Duration::from_secs(5)).unwrap();
        assert_eq!(detector.base_url(), "http://127.0.0.1:9000");
        assert_eq!(detector.model_name(), "YOLOv8");
    }

    #[test]
    fn test_failure_message_prefers_service_text() {
        let status = reqwest::StatusCode::INTERNAL_SERVER_ERROR;
        assert_eq!(
            failure_message(status, r#"{"error": "Model not loaded"}"#),
            "Model not loaded"
        );
        assert_eq!(failure_message(status, r#"{"detail": "busy"}"#), "busy");
        assert_eq!(failure_message(status, "upstream exploded\n"), "upstream exploded");
        assert_eq!(
            failure_message(reqwest::StatusCode::BAD_GATEWAY, ""),
            "detector returned 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_transport_error() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let detector =
            HttpDetector::new("http://127.0.0.1:9", "YOLOv8", Duration::from_secs(2)).unwrap();
        let err = detector.detect(vec![0xff, 0xd8, 0xff]).await.unwrap_err();
        assert!(matches!(err, DetectError::Transport(_)));
    }
}
