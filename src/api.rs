// src/api.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::error::AggregationError;
use crate::profile::{Diagnostic, SourceFailure};
use crate::source::SourceId;
use crate::Aggregator;

#[derive(Clone)]
pub struct AppState {
    aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }
}

/// `/health` and `/aggregate`. The binary merges `/metrics` on top.
pub fn router(aggregator: Arc<Aggregator>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/aggregate", post(aggregate))
        .with_state(AppState::new(aggregator))
}

#[derive(Debug, serde::Deserialize)]
pub struct AggregateReq {
    pub company: String,
    /// Defaults to the configured sources.
    #[serde(default)]
    pub sources: Vec<SourceId>,
    #[serde(default)]
    pub budget_ms: Option<u64>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorResp {
    error: String,
    failures: Vec<SourceFailure>,
    diagnostics: Vec<Diagnostic>,
}

impl IntoResponse for AggregationError {
    fn into_response(self) -> Response {
        let status = match self {
            AggregationError::InvalidCompanyName => StatusCode::BAD_REQUEST,
            AggregationError::NoDataAvailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let body = ErrorResp {
            error: self.to_string(),
            failures: self.failures().to_vec(),
            diagnostics: self.diagnostics().to_vec(),
        };
        (status, Json(body)).into_response()
    }
}

async fn aggregate(State(state): State<AppState>, Json(req): Json<AggregateReq>) -> Response {
    let budget = req
        .budget_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.aggregator.default_budget())
        .min(state.aggregator.max_budget());
    match state.aggregator.aggregate(&req.company, &req.sources, budget).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => e.into_response(),
    }
}
