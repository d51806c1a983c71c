//! HTTP surface: scoring, health, banner and metrics endpoints

use crate::error::ScoringError;
use crate::metrics::{MetricsSnapshot, ScoringMetrics};
use crate::scoring::ScoringService;
use crate::types::score::{HealthStatus, ScoreResult};
use crate::types::transaction::TransactionRecord;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScoringService>,
    pub metrics: Arc<ScoringMetrics>,
}

impl AppState {
    pub fn new(service: Arc<ScoringService>, metrics: Arc<ScoringMetrics>) -> Self {
        Self { service, metrics }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/score", post(score))
        .route("/metrics", get(metrics))
        .with_state(state)
}

impl ScoringError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScoringError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ScoringError::InvalidRecord(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScoringError::Evaluation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ScoringError::ModelUnavailable => "MODEL_UNAVAILABLE",
            ScoringError::InvalidRecord(_) => "INVALID_RECORD",
            ScoringError::Evaluation(_) => "EVALUATION_FAILED",
        }
    }
}

impl IntoResponse for ScoringError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Fraud Scoring API - ready to score transactions",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.service.health())
}

async fn score(
    State(state): State<AppState>,
    Json(record): Json<TransactionRecord>,
) -> Result<Json<ScoreResult>, ScoringError> {
    let start = Instant::now();
    let outcome = state.service.score(&record);
    state.metrics.record(start.elapsed(), &outcome);

    outcome.map(Json)
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::ValidationError;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ScoringError::ModelUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ScoringError::InvalidRecord(ValidationError::Hour(30)).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ScoringError::Evaluation("nan".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ScoringError::ModelUnavailable.error_code(), "MODEL_UNAVAILABLE");
        assert_eq!(
            ScoringError::Evaluation(String::new()).error_code(),
            "EVALUATION_FAILED"
        );
    }
}
