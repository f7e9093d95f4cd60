//! API route definitions.

use axum::extract::{Form, Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::error::ApiError;
use super::state::AppState;
use crate::incident::policy::CaptureMethod;
use crate::ingest::DetectionOutcome;

type ApiResult = Result<Json<Value>, ApiError>;

pub fn root_routes() -> Router<AppState> {
    Router::new().route("/", get(health))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/tailgating", post(report_tailgating))
        .route("/incidents", get(list_incidents))
        .route("/incidents/{id}", get(get_incident).delete(delete_incident))
        .route("/stats", get(stats))
        .route("/detect/image", post(detect_image))
        .route("/detect/base64", post(detect_base64))
        .route("/detect/model-info", get(model_info))
        .route("/detect/load-model", post(load_model))
}

/// Body of a client-reported tailgating alert.
#[derive(Debug, Deserialize)]
struct TailgatingAlert {
    persons: u32,
    location: Map<String, Value>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Base64Frame {
    image_data: String,
}

async fn health(State(state): State<AppState>) -> ApiResult {
    let total = state.ingest.incident_count().await?;
    Ok(Json(json!({
        "message": "TailGuard - Tailgating Detection Backend Running",
        "status": "active",
        "version": env!("CARGO_PKG_VERSION"),
        "total_incidents": total,
    })))
}

async fn report_tailgating(
    State(state): State<AppState>,
    Json(alert): Json<TailgatingAlert>,
) -> ApiResult {
    let incident = state
        .ingest
        .record_manual(alert.persons, alert.location, alert.timestamp)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Tailgating alert received and logged",
        "incident_id": incident.id,
        "persons_detected": incident.persons,
        "timestamp": incident.timestamp,
    })))
}

async fn list_incidents(State(state): State<AppState>) -> ApiResult {
    let incidents = state.ingest.list_incidents().await?;
    Ok(Json(json!({
        "status": "success",
        "total": incidents.len(),
        "incidents": incidents,
    })))
}

async fn get_incident(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult {
    let incident = state.ingest.get_incident(id).await?;
    Ok(Json(json!({ "status": "success", "incident": incident })))
}

async fn delete_incident(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult {
    state.ingest.delete_incident(id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Incident {} deleted", id),
    })))
}

async fn stats(State(state): State<AppState>) -> ApiResult {
    let stats = state.ingest.get_stats().await?;
    Ok(Json(json!({
        "status": "success",
        "stats": {
            "total_incidents": stats.total,
            "active_incidents": stats.active,
            "today_incidents": stats.today,
        }
    })))
}

fn detection_body(outcome: DetectionOutcome) -> Json<Value> {
    let mut body = json!({
        "status": "success",
        "person_count": outcome.result.person_count,
        "detections": outcome.result.detections,
        "image_shape": outcome.result.image_shape,
        "tailgating_alert": outcome.tailgating_alert,
    });
    if let Some(incident) = outcome.incident {
        body["incident_id"] = json!(incident.id);
    }
    Json(body)
}

async fn detect_image(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            image = Some(bytes.to_vec());
            break;
        }
    }

    let image = image.ok_or_else(|| ApiError::bad_request("missing multipart field `file`"))?;
    if image.is_empty() {
        return Err(ApiError::bad_request("uploaded file is empty"));
    }

    let outcome = state
        .ingest
        .detect_and_record(image, CaptureMethod::ImageUpload)
        .await?;
    Ok(detection_body(outcome))
}

async fn detect_base64(State(state): State<AppState>, Form(frame): Form<Base64Frame>) -> ApiResult {
    let outcome = state.ingest.detect_base64(&frame.image_data).await?;
    Ok(detection_body(outcome))
}

async fn model_info(State(state): State<AppState>) -> ApiResult {
    let info = state.ingest.model_info().await?;
    Ok(Json(json!({ "status": "success", "model_info": info })))
}

async fn load_model(State(state): State<AppState>) -> ApiResult {
    state.ingest.load_model().await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Detector model loaded successfully",
    })))
}
