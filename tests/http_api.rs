//! HTTP surface driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fraud_scoring::api::{router, AppState};
use fraud_scoring::feature_extractor::{FeatureExtractor, FeatureVector};
use fraud_scoring::metrics::ScoringMetrics;
use fraud_scoring::models::{ModelState, ProbabilityModel};
use fraud_scoring::threshold::{ThresholdConfig, ThresholdSource};
use fraud_scoring::ScoringService;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Probability rises with the country-novelty and velocity features.
struct StubModel;

impl ProbabilityModel for StubModel {
    fn predict_probability(&self, features: &FeatureVector) -> f64 {
        (0.05 + 0.5 * features[2] + 0.05 * features[4]).min(1.0)
    }
}

struct BrokenModel;

impl ProbabilityModel for BrokenModel {
    fn predict_probability(&self, _features: &FeatureVector) -> f64 {
        f64::NAN
    }
}

fn app_with(model: ModelState, threshold: f64) -> (Router, Arc<ScoringMetrics>) {
    let service = ScoringService::new(
        model,
        ThresholdConfig::new(threshold, ThresholdSource::Default).unwrap(),
    );
    let metrics = Arc::new(ScoringMetrics::new());
    (router(AppState::new(Arc::new(service), metrics.clone())), metrics)
}

fn app(threshold: f64) -> (Router, Arc<ScoringMetrics>) {
    app_with(
        ModelState::ready(Arc::new(StubModel), FeatureExtractor::default()),
        threshold,
    )
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn score_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/score")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_score_flags_risky_transaction() {
    let (app, _) = app(0.6);

    let (status, body) = send(
        app,
        score_request(json!({
            "amount": 1500.0,
            "hour": 2,
            "country_novelty": 1,
            "device_novelty": 1,
            "user_velocity_60s": 6
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["is_fraud"].as_bool().unwrap());
    assert_eq!(body["confidence"], "high");
    let p = body["fraud_probability"].as_f64().unwrap();
    assert!((p - 0.85).abs() < 1e-9);
}

#[tokio::test]
async fn test_score_accepts_legacy_field_names() {
    let (app, _) = app(0.6);

    let (status, body) = send(
        app,
        score_request(json!({
            "amount": 20.0,
            "hour": 14,
            "new_country": 0,
            "new_device": 0,
            "velocity": 0
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_fraud"], false);
    assert_eq!(body["confidence"], "low");
}

#[tokio::test]
async fn test_invalid_record_is_unprocessable() {
    let (app, metrics) = app(0.6);

    let (status, body) = send(
        app,
        score_request(json!({
            "amount": 20.0,
            "hour": 30,
            "country_novelty": 0,
            "device_novelty": 0,
            "user_velocity_60s": 0
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_RECORD");
    assert_eq!(metrics.snapshot().invalid, 1);
}

#[tokio::test]
async fn test_degraded_service_returns_unavailable() {
    let (app, _) = app_with(ModelState::unavailable("artifact missing"), 0.98);

    let (status, body) = send(
        app.clone(),
        score_request(json!({
            "amount": 20.0,
            "hour": 14,
            "country_novelty": 0,
            "device_novelty": 0,
            "user_velocity_60s": 0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "MODEL_UNAVAILABLE");

    let (status, health) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["model_loaded"], false);
    assert_eq!(health["threshold"], 0.98);
}

#[tokio::test]
async fn test_model_failure_is_internal_error() {
    let (app, metrics) = app_with(
        ModelState::ready(Arc::new(BrokenModel), FeatureExtractor::default()),
        0.5,
    );

    let (status, body) = send(
        app,
        score_request(json!({
            "amount": 20.0,
            "hour": 14,
            "country_novelty": 0,
            "device_novelty": 0,
            "user_velocity_60s": 0
        })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "EVALUATION_FAILED");
    assert_eq!(metrics.snapshot().errors, 1);
}

#[tokio::test]
async fn test_health_root_and_metrics() {
    let (app, _) = app(0.73);

    let (status, health) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["model_loaded"], true);
    assert_eq!(health["threshold"], 0.73);

    let (status, banner) = send(app.clone(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(banner["message"].as_str().unwrap().contains("Fraud Scoring API"));

    let (status, _) = send(
        app.clone(),
        score_request(json!({
            "amount": 20.0,
            "hour": 14,
            "country_novelty": 0,
            "device_novelty": 0,
            "user_velocity_60s": 0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, snapshot) = send(app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["scored"], 1);
    assert_eq!(snapshot["confidence"]["low"], 1);
}
