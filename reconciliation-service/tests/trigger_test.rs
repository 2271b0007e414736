//! Integration tests for the HTTP trigger and status endpoints.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::{completed_invoice, grn_row, init_tracing, test_config, MemoryStore};
use reconciliation_service::startup::{api_router, AppState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app_state(store: Arc<MemoryStore>) -> AppState {
    AppState {
        config: test_config(),
        store,
        completion: None,
    }
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    init_tracing();
    let app = api_router(app_state(Arc::new(MemoryStore::new())));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "reconciliation-service");
}

#[tokio::test]
async fn out_of_range_parameters_are_rejected_before_any_work() {
    init_tracing();
    let store = Arc::new(MemoryStore::new().with_invoice(completed_invoice(None, None, 100)));
    let app = api_router(app_state(store.clone()));

    for body in [
        r#"{"delay_seconds": 11.0}"#,
        r#"{"max_concurrent": 0}"#,
        r#"{"max_concurrent": 51}"#,
        r#"{"batch_size": 5}"#,
    ] {
        let response = app
            .clone()
            .oneshot(json_post("/api/reconciliation/run", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    // No run started, so nothing was persisted.
    assert!(store.stored_records().is_empty());
}

#[tokio::test]
async fn run_endpoint_returns_stats_and_results() {
    init_tracing();
    let store = Arc::new(
        MemoryStore::new()
            .with_invoice(completed_invoice(Some("PO-1"), Some("GRN-1"), 100))
            .with_grn_item(grn_row("PO-1", Some("GRN-1"), 100)),
    );
    let app = api_router(app_state(store));

    let response = app
        .oneshot(json_post("/api/reconciliation/run", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_processed"], 1);
    assert_eq!(body["data"]["stats"]["perfect_matches"], 1);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["data"]["results"][0]["match_status"],
        "perfect_match"
    );
    assert_eq!(body["data"]["processing_params"]["batch_size"], 100);
}

#[tokio::test]
async fn run_endpoint_succeeds_on_an_empty_store() {
    init_tracing();
    let app = api_router(app_state(Arc::new(MemoryStore::new())));

    let response = app
        .oneshot(json_post("/api/reconciliation/run", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_processed"], 0);
}

#[tokio::test]
async fn run_failure_still_returns_stats() {
    init_tracing();
    let mut store = MemoryStore::new();
    store.fail_selection = true;
    let app = api_router(app_state(Arc::new(store)));

    let response = app
        .oneshot(json_post("/api/reconciliation/run", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["stats"]["total_processed"], 0);
    assert!(body["error"].as_str().unwrap().contains("Database error"));
}

#[tokio::test]
async fn status_endpoint_reports_breakdown_and_recent_count() {
    init_tracing();
    let store = Arc::new(
        MemoryStore::new()
            .with_invoice(completed_invoice(Some("PO-1"), Some("GRN-1"), 100))
            .with_invoice(completed_invoice(None, None, 100))
            .with_grn_item(grn_row("PO-1", Some("GRN-1"), 100)),
    );
    let app = api_router(app_state(store));

    let run_response = app
        .clone()
        .oneshot(json_post("/api/reconciliation/run", "{}"))
        .await
        .unwrap();
    assert_eq!(run_response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/reconciliation/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_reconciliations"], 2);
    assert_eq!(body["data"]["recent_24h"], 2);

    let breakdown = body["data"]["status_breakdown"].as_array().unwrap();
    assert_eq!(breakdown.len(), 2);
    assert!(breakdown.iter().any(|row| {
        row["match_status"] == "perfect_match" && row["count"] == 1
    }));
    assert!(breakdown.iter().any(|row| {
        row["match_status"] == "no_grn_found" && row["count"] == 1
    }));
}
