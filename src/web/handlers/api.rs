use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use crate::intent::Intent;
use crate::patterns::Language;
use crate::pipeline::{ErrorDetail, PipelineResult, QueryRequest, ResultSummary};
use crate::store::SchemaCatalog;
use crate::synth::QueryPlan;
use crate::viz::VizOutcome;
use crate::web::state::AppState;

// Message envelope

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub query: Option<String>,
    pub context: Option<String>,
    pub language: Option<String>,
    pub limit: Option<usize>,
    pub success: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_plan: Option<QueryPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_spec: Option<VizOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaCatalog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<PipelineResult>>,
}

impl MessageResponse {
    fn from_result(result: PipelineResult) -> Self {
        Self {
            id: result.id,
            success: result.success,
            intent: result.intent,
            sql_plan: result.sql_plan,
            result_summary: result.result_summary,
            chart_spec: Some(result.chart_spec),
            error: result.error,
            suggestions: result.suggestions,
            schema: None,
            history: None,
        }
    }

    fn bare(id: String, success: bool) -> Self {
        Self {
            id,
            success,
            intent: None,
            sql_plan: None,
            result_summary: None,
            chart_spec: None,
            error: None,
            suggestions: Vec::new(),
            schema: None,
            history: None,
        }
    }
}

/// Single entry point speaking the message contract:
/// `{id, type: "query"|"schema"|"history", query?, context?, limit?}`.
pub async fn message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MessageRequest>,
) -> Json<MessageResponse> {
    debug!(kind = %payload.kind, "message request");

    match payload.kind.as_str() {
        "query" => {
            let Some(question) = payload.query.filter(|q| !q.trim().is_empty()) else {
                let id = payload.id.unwrap_or_else(|| "unknown".to_string());
                return Json(MessageResponse::bare(id, false));
            };
            let request = QueryRequest::new(
                payload.id,
                question,
                payload.context,
                payload.language.as_deref().and_then(Language::parse),
            );
            let result = state.orchestrator.run(request).await;
            Json(MessageResponse::from_result(result))
        }
        "schema" => {
            let id = payload.id.unwrap_or_else(|| "schema".to_string());
            match state.orchestrator.schema().await {
                Ok(catalog) => {
                    let mut response = MessageResponse::bare(id, true);
                    response.schema = Some(catalog);
                    Json(response)
                }
                Err(e) => {
                    error!(error = %e, "schema request failed");
                    Json(MessageResponse::bare(id, false))
                }
            }
        }
        "history" => {
            let id = payload.id.unwrap_or_else(|| "history".to_string());
            let limit = payload.limit.unwrap_or(10);
            let entries = state.orchestrator.history(limit, payload.success).await;
            let mut response = MessageResponse::bare(id, true);
            response.history = Some(entries);
            Json(response)
        }
        other => {
            debug!(kind = %other, "unknown message type");
            let id = payload.id.unwrap_or_else(|| "unknown".to_string());
            Json(MessageResponse::bare(id, false))
        }
    }
}

// Direct REST routes

#[derive(Debug, Deserialize)]
pub struct NlQueryRequest {
    pub question: String,
    pub context: Option<String>,
    pub language: Option<String>,
}

pub async fn nl_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NlQueryRequest>,
) -> Result<Json<PipelineResult>, (StatusCode, String)> {
    if payload.question.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No question provided".to_string()));
    }

    let request = QueryRequest::new(
        None,
        payload.question,
        payload.context,
        payload.language.as_deref().and_then(Language::parse),
    );
    let result = state.orchestrator.run(request).await;
    Ok(Json(result))
}

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchemaCatalog>, (StatusCode, String)> {
    state.orchestrator.schema().await.map(Json).map_err(|e| {
        error!(error = %e, "failed to read schema");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
    pub success: Option<bool>,
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<PipelineResult>> {
    let limit = params.limit.unwrap_or(10);
    Json(state.orchestrator.history(limit, params.success).await)
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub catalog_revision: u32,
    pub pattern_count: usize,
    pub history_length: usize,
    pub generation_backend: String,
    pub fallback_enabled: bool,
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        catalog_revision: state.orchestrator.catalog_revision(),
        pattern_count: state.orchestrator.catalog_len(),
        history_length: state.orchestrator.history_len().await,
        generation_backend: state.config.llm.backend.clone(),
        fallback_enabled: state.config.llm.fallback_enabled,
    })
}
