use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::warn;

use super::super::AppState;
use crate::core::metrics::MetricRecord;

/// POST /api/metrics: ingest a batch of metric records.
pub async fn save_metrics(
    State(state): State<AppState>,
    payload: Result<Json<Vec<MetricRecord>>, JsonRejection>,
) -> impl IntoResponse {
    let Json(records) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("metrics request rejected: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Request must be JSON" })),
            );
        }
    };
    if records.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No data provided" })),
        );
    }

    let total = state.metrics.append(records);
    (
        StatusCode::CREATED,
        Json(json!({
            "message": "Data saved successfully",
            "total": total,
        })),
    )
}

/// GET /api/metrics: everything recorded this process lifetime.
pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "data": state.metrics.list() }))
}
