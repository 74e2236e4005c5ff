use axum::Json;
use axum::response::IntoResponse;
use serde_json::json;

/// GET /api/health: liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
