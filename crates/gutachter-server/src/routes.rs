//! HTTP surface: health, scheme listing and evaluation.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gutachter_core::{ContextType, EvaluationResult, ListFilter, OutputRange, ScaleInfo};
use gutachter_runtime::{EvaluationEngine, EvaluationOutcome, OutcomeMetadata};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EvaluationEngine>,
    /// Deadline for one evaluation request.
    pub http_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/schemes", get(list_schemes))
        .route("/evaluate", post(evaluate))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Validation(message) = self;
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    schemas_loaded: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        schemas_loaded: state.engine.registry().len(),
    })
}

#[derive(Debug, Deserialize)]
struct SchemesQuery {
    #[serde(default)]
    include_parts: bool,
    context_type: Option<ContextType>,
}

#[derive(Debug, Serialize)]
struct SchemeSummary {
    id: String,
    name: String,
    kind: String,
    dimension: String,
    output_range: OutputRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependencies: Option<Vec<String>>,
}

async fn list_schemes(
    State(state): State<AppState>,
    Query(query): Query<SchemesQuery>,
) -> Json<Vec<SchemeSummary>> {
    let filter = ListFilter {
        kind: None,
        include_parts: query.include_parts,
        context_type: query.context_type,
    };
    let summaries = state
        .engine
        .registry()
        .list(&filter)
        .iter()
        .map(|scheme| SchemeSummary {
            id: scheme.id.clone(),
            name: scheme.name.clone(),
            kind: scheme.kind_name().to_string(),
            dimension: scheme.dimension.clone(),
            output_range: scheme.output_range.clone(),
            dependencies: (!scheme.dependencies.is_empty()).then(|| scheme.dependencies.clone()),
        })
        .collect();
    Json(summaries)
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    text: String,
    schemes: Vec<String>,
    #[serde(default)]
    context_type: ContextType,
    #[serde(default = "default_true")]
    include_reasoning: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct EvaluateResponse {
    results: Vec<EvaluationResult>,
    gates_passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    overall_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overall_label: Option<String>,
    metadata: ResponseMetadata,
    provenance: Provenance,
}

#[derive(Debug, Serialize)]
struct ResponseMetadata {
    processing_time_ms: u64,
    model_used: String,
    include_reasoning: bool,
}

#[derive(Debug, Serialize)]
struct Provenance {
    timestamp: String,
    api_version: &'static str,
    text_length: usize,
    schemes_count: usize,
}

async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    validate(&request)?;

    let started = chrono::Utc::now();
    let evaluation = state
        .engine
        .evaluate(&request.text, &request.schemes, request.context_type);
    let outcome = match tokio::time::timeout(state.http_timeout, evaluation).await {
        Ok(outcome) => outcome,
        // Dropping the evaluation future cancels every inflight judge call
        // and releases their limiter slots; the response carries a fallback
        // result per requested scheme.
        Err(_) => deadline_outcome(&state, &request),
    };

    let results = if request.include_reasoning {
        outcome.results
    } else {
        outcome.results.iter().map(EvaluationResult::redacted).collect()
    };

    Ok(Json(EvaluateResponse {
        results,
        gates_passed: outcome.gates_passed,
        overall_score: outcome.overall_score,
        overall_label: outcome.overall_label,
        metadata: ResponseMetadata {
            processing_time_ms: outcome.metadata.processing_time_ms,
            model_used: outcome.metadata.model_used,
            include_reasoning: request.include_reasoning,
        },
        provenance: Provenance {
            timestamp: started.to_rfc3339(),
            api_version: API_VERSION,
            text_length: request.text.chars().count(),
            schemes_count: request.schemes.len(),
        },
    }))
}

fn validate(request: &EvaluateRequest) -> Result<(), ApiError> {
    let chars = request.text.chars().count();
    if !(10..=50_000).contains(&chars) {
        return Err(ApiError::Validation(
            "text must be between 10 and 50000 characters".to_string(),
        ));
    }
    if request.schemes.is_empty() || request.schemes.len() > 10 {
        return Err(ApiError::Validation(
            "schemes must list between 1 and 10 entries".to_string(),
        ));
    }
    Ok(())
}

fn deadline_outcome(state: &AppState, request: &EvaluateRequest) -> EvaluationOutcome {
    tracing::warn!(
        timeout_s = state.http_timeout.as_secs(),
        "request deadline exceeded, emitting fallback results"
    );
    let registry = state.engine.registry();
    let results: Vec<EvaluationResult> = request
        .schemes
        .iter()
        .map(|id| match registry.get(id) {
            Some(scheme) => {
                EvaluationResult::errored(&scheme, "Zeitüberschreitung der Anfrage")
            }
            None => EvaluationResult::unknown_scheme(id),
        })
        .collect();

    let gates_passed = results.iter().all(|r| {
        !(matches!(r.scale_info, ScaleInfo::Gate { .. }) && r.value.as_bool() == Some(false))
    });

    EvaluationOutcome {
        results,
        gates_passed,
        overall_score: None,
        overall_label: None,
        metadata: OutcomeMetadata {
            processing_time_ms: state.http_timeout.as_millis() as u64,
            model_used: state.engine.model().to_string(),
        },
    }
}
