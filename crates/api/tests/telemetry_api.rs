//! Integration tests for ingestion and snapshot query endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_json, post_raw, wait_for_sequence};
use cranewatch_pipeline::config::PipelineConfig;
use serde_json::json;

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ingest_returns_202_and_commits() {
    let (app, pipeline) = common::build_test_app();
    let mut sub = pipeline.notifier.subscribe("test").await;

    let response = post_json(
        app.clone(),
        "/api/v1/iot-data",
        json!([
            {
                "name": "LoadCell",
                "assets": [{"id": "Load", "value": 3500, "timestamp": "2024-05-01T08:00:00Z"}]
            },
            {
                "name": "onboard_io",
                "assets": [
                    {"id": "Hoist_Up", "value": 0},
                    {"id": "Voltage_L1", "value": "n/a"}
                ]
            }
        ]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let receipt = body_json(response).await;
    assert_eq!(receipt["data"]["received_services"], 2);
    assert_eq!(receipt["data"]["received_assets"], 3);
    assert_eq!(receipt["data"]["queued_batches"], 2);
    assert_eq!(receipt["data"]["rejected_readings"].as_array().unwrap().len(), 1);

    wait_for_sequence(&mut sub, 2).await;

    let json = body_json(get(app, "/api/v1/iot-data").await).await;
    let data = &json["data"];
    assert_eq!(data["sequence"], 2);
    assert_eq!(data["total_services"], 2);
    assert_eq!(data["total_assets"], 2);
    assert_eq!(data["services"]["LoadCell"][0]["value_type"], "load");
    assert_eq!(data["services"]["LoadCell"][0]["unit"], "kg");
    assert!(data["services"]["LoadCell"][0]["counters"].is_null());
    assert_eq!(
        data["services"]["onboard_io"][0]["counters"]["total_operation_count"],
        0
    );

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn wrapped_payload_shape_is_accepted() {
    let (app, pipeline) = common::build_test_app();

    let response = post_json(
        app,
        "/api/v1/iot-data",
        json!({"services": [{"name": "LoadCell", "assets": [{"id": "Load", "value": 1}]}]}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_payload_returns_400() {
    let (app, pipeline) = common::build_test_app();

    let response = post_raw(app.clone(), "/api/v1/iot-data", "{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let response = post_json(app, "/api/v1/iot-data", json!([{"assets": []}])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn payload_larger_than_queue_returns_503() {
    let (app, pipeline) = common::build_test_app_with(PipelineConfig {
        queue_capacity: 1,
        ..PipelineConfig::default()
    });

    let response = post_json(
        app,
        "/api/v1/iot-data",
        json!([
            {"name": "a", "assets": [{"id": "Load", "value": 1}]},
            {"name": "b", "assets": [{"id": "Load", "value": 2}]}
        ]),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["retry-after"], "1");
    assert_eq!(body_json(response).await["code"], "QUEUE_FULL");

    pipeline.shutdown().await.unwrap();
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_snapshot_before_any_commit() {
    let (app, pipeline) = common::build_test_app();

    let json = body_json(get(app, "/api/v1/iot-data").await).await;

    assert_eq!(json["data"]["sequence"], 0);
    assert!(json["data"]["last_updated"].is_null());
    assert_eq!(json["data"]["services"], json!({}));

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn history_returns_newest_entries_up_to_limit() {
    let (app, pipeline) = common::build_test_app();
    let mut sub = pipeline.notifier.subscribe("test").await;

    for value in 0..4 {
        let response = post_json(
            app.clone(),
            "/api/v1/iot-data",
            json!([{"name": "LoadCell", "assets": [{"id": "Load", "value": value}]}]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    wait_for_sequence(&mut sub, 4).await;

    let json = body_json(get(app.clone(), "/api/v1/iot-data/history?limit=2").await).await;
    let entries = json["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["sequence"], 3);
    assert_eq!(entries[1]["sequence"], 4);
    assert_eq!(entries[1]["readings"][0]["value"], 3.0);

    let json = body_json(get(app, "/api/v1/iot-data/history").await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 4);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn service_lookup() {
    let (app, pipeline) = common::build_test_app();
    let mut sub = pipeline.notifier.subscribe("test").await;

    post_json(
        app.clone(),
        "/api/v1/iot-data",
        json!([{"name": "LoadCell", "assets": [{"id": "Load", "value": 4200}]}]),
    )
    .await;
    wait_for_sequence(&mut sub, 1).await;

    let response = get(app.clone(), "/api/v1/iot-data/services/LoadCell").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"][0]["point_id"], "Load");
    assert_eq!(json["data"][0]["value"], 4200.0);

    let response = get(app, "/api/v1/iot-data/services/Unknown").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn stream_requires_websocket_upgrade() {
    let (app, pipeline) = common::build_test_app();

    let response = get(app, "/api/v1/iot-data/stream").await;

    assert!(response.status().is_client_error());
    pipeline.shutdown().await.unwrap();
}
