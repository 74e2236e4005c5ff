use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{harvest, health, metrics};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{api_port}"),
        format!("http://localhost:{api_port}"),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    let cors = build_localhost_cors(state.settings.api.port);
    Router::new()
        .route("/api/harvest", post(harvest::start_harvest))
        .route("/api/harvest/{job_id}", get(harvest::get_harvest_progress))
        .route(
            "/api/metrics",
            get(metrics::get_metrics).post(metrics::save_metrics),
        )
        .route("/api/health", get(health::health))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(cors)
        .with_state(state)
}
