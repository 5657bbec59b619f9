#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use cranewatch_api::config::ServerConfig;
use cranewatch_api::router::build_app_router;
use cranewatch_api::state::AppState;
use cranewatch_events::Subscription;
use cranewatch_pipeline::config::PipelineConfig;
use cranewatch_pipeline::persistence::NoopSink;
use cranewatch_pipeline::Pipeline;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 10,
    }
}

/// Start a pipeline with `pipeline_config` and build the full application
/// router on top of it, with the same middleware stack production uses.
///
/// The pipeline is returned so tests can wait on commits and shut it down.
pub fn build_test_app_with(pipeline_config: PipelineConfig) -> (Router, Pipeline) {
    let config = test_config();
    let pipeline = Pipeline::start(&pipeline_config, Arc::new(NoopSink));
    let state = AppState::new(config.clone(), &pipeline);
    (build_app_router(state, &config), pipeline)
}

pub fn build_test_app() -> (Router, Pipeline) {
    build_test_app_with(PipelineConfig::default())
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Wait until the processor has committed at least `sequence` snapshots.
pub async fn wait_for_sequence(subscription: &mut Subscription, sequence: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = subscription.recv().await.expect("subscription closed");
            if snapshot.sequence >= sequence {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for commit");
}
