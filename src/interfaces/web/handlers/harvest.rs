use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::warn;

use super::super::AppState;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartHarvestRequest {
    pub device_id: String,
    pub beehive_id: String,
}

/// POST /api/harvest: start a new harvest job. Returns the job id
/// immediately; the job runs on its own task and is observed by polling.
pub async fn start_harvest(
    State(state): State<AppState>,
    payload: Result<Json<StartHarvestRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("harvest request rejected: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Request must be JSON with deviceId and beehiveId" })),
            );
        }
    };

    let job_id = state
        .harvest
        .start_harvest(&request.device_id, &request.beehive_id);
    (
        StatusCode::CREATED,
        Json(json!({
            "jobId": job_id,
            "message": "Harvest started successfully",
        })),
    )
}

/// GET /api/harvest/{job_id}: current phase and progress.
pub async fn get_harvest_progress(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.harvest.registry.get(&job_id) {
        Some(job) => (
            StatusCode::OK,
            Json(json!({
                "phase": job.phase.as_str(),
                "progress": job.progress,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Harvest job not found" })),
        ),
    }
}
