//! Axum route handlers for the Print API.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::dispatch::adapter::normalize_value;
use crate::dispatch::batch::TracingObserver;
use crate::dispatch::models::{BatchSummary, LabelRequest, Pacing};
use crate::errors::AppError;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub gateway_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SingleRequest {
    /// One label object in either field casing.
    pub label: Value,
    pub gateway_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub labels: Vec<Value>,
    pub pool_size: Option<usize>,
    pub sleep_seconds: Option<u64>,
    pub gateway_url: Option<String>,
}

/// Request value first, then `GATEWAY_URL`. An empty result is left for the
/// engine, which rejects it on the gateway and batch paths only.
fn resolve_gateway<'a>(state: &'a AppState, requested: Option<&'a str>) -> &'a str {
    state.gateway_url(requested).unwrap_or_default()
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/print
/// Body is raw label data in any accepted shape.
pub async fn handle_print(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    body: String,
) -> Result<Json<BatchSummary>, AppError> {
    let gateway = resolve_gateway(&state, query.gateway_url.as_deref());
    let summary = state
        .dispatcher
        .dispatch_from_raw(&body, gateway, &TracingObserver)
        .await?;
    Ok(Json(summary))
}

/// POST /api/v1/print/single
pub async fn handle_print_single(
    State(state): State<AppState>,
    Json(req): Json<SingleRequest>,
) -> Result<Json<BatchSummary>, AppError> {
    let gateway = resolve_gateway(&state, req.gateway_url.as_deref());
    let input = normalize_value(req.label)?;
    let [raw] = input.labels.as_slice() else {
        return Err(AppError::Validation(
            "Expected exactly one label object".to_string(),
        ));
    };
    let label = LabelRequest::validate(raw, 0)?;
    let summary = state.dispatcher.dispatch_one(&label, gateway).await?;
    Ok(Json(summary))
}

/// POST /api/v1/print/batch
pub async fn handle_print_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchSummary>, AppError> {
    let gateway = resolve_gateway(&state, req.gateway_url.as_deref());
    let input = normalize_value(Value::Array(req.labels))?;
    let defaults = state.dispatcher.settings().default_pacing;
    let pacing = Pacing::new(
        req.pool_size.unwrap_or(defaults.pool_size),
        req.sleep_seconds.unwrap_or(defaults.delay_secs),
    );
    let summary = state
        .dispatcher
        .dispatch_batch(&input.labels, pacing, gateway, &TracingObserver)
        .await?;
    Ok(Json(summary))
}
