use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use super::AppState;
use super::router::build_api_router;
use crate::core::harvest::HarvestContext;
use crate::core::metrics::InMemoryMetricsStore;
use crate::core::settings::Settings;

fn test_router() -> Router {
    let settings = Arc::new(Settings::default());
    let store = Arc::new(InMemoryMetricsStore::default());
    let (log_tx, _) = tokio::sync::broadcast::channel(16);
    build_api_router(AppState {
        harvest: HarvestContext::new(settings.clone(), store.clone()),
        metrics: store,
        settings,
        log_tx,
    })
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn starting_a_harvest_returns_201_and_a_pollable_job() {
    let router = test_router();

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/harvest",
            json!({ "deviceId": "dev-1", "beehiveId": "hive-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let job_id = body["jobId"].as_str().expect("jobId in response").to_string();
    assert_eq!(body["message"], "Harvest started successfully");

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/api/harvest/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["phase"], "calibrating");
    assert!(body["progress"].is_u64());
}

#[tokio::test]
async fn a_non_json_body_is_rejected_with_400() {
    let router = test_router();
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/harvest")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("smoke the bees"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn a_body_missing_fields_is_rejected_with_400() {
    let router = test_router();
    let response = router
        .oneshot(json_request(
            "POST",
            "/api/harvest",
            json!({ "deviceId": "dev-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn polling_an_unknown_job_returns_404() {
    let router = test_router();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/harvest/no-such-job")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Harvest job not found");
}

#[tokio::test]
async fn metric_batches_roundtrip_through_the_store() {
    let router = test_router();

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/metrics",
            json!([{
                "datetime": "2026-08-07T10:00:00.000Z",
                "dataTypeId": "temperature",
                "value": 34.9,
            }]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/api/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["dataTypeId"], "temperature");

    let response = router
        .oneshot(json_request("POST", "/api/metrics", json!([])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_answers_ok() {
    let router = test_router();
    let response = router
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}
