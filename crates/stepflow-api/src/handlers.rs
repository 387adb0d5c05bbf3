//! Route handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use stepflow_engine::ExecutionStatus;
use stepflow_protocols::{DefinitionStatus, NewWorkflow, Payload, WorkflowDefinition};

use crate::error::ApiError;
use crate::state::AppState;

/// Response for listing workflows.
#[derive(Debug, Serialize)]
pub struct WorkflowListResponse {
    pub count: usize,
    pub workflows: Vec<WorkflowDefinition>,
}

/// Body of `PUT /workflows/{trigger}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: DefinitionStatus,
}

/// Body of `POST /workflows/{trigger}/trigger`.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub input: Payload,
}

/// POST /workflows
pub async fn create_workflow(
    State(state): State<Arc<AppState>>,
    Json(workflow): Json<NewWorkflow>,
) -> Result<impl IntoResponse, ApiError> {
    let definition = state.definitions.register(workflow).await?;
    info!(
        trigger = %definition.trigger,
        steps = definition.total_steps,
        "Registered workflow {}",
        definition.name
    );
    Ok((StatusCode::CREATED, Json(definition)))
}

/// GET /workflows
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WorkflowListResponse>, ApiError> {
    let workflows = state.definitions.list().await?;
    Ok(Json(WorkflowListResponse {
        count: workflows.len(),
        workflows,
    }))
}

/// GET /workflows/{trigger}
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(trigger): Path<String>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    Ok(Json(state.definitions.get_by_trigger(&trigger).await?))
}

/// PUT /workflows/{trigger}/status
pub async fn update_workflow_status(
    State(state): State<Arc<AppState>>,
    Path(trigger): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    let definition = state.definitions.set_status(&trigger, request.status).await?;
    info!("Workflow {} is now {}", trigger, definition.status);
    Ok(Json(definition))
}

/// POST /workflows/{trigger}/trigger
pub async fn trigger_workflow(
    State(state): State<Arc<AppState>>,
    Path(trigger): Path<String>,
    Json(request): Json<TriggerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.triggers.trigger(&trigger, request.input).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// GET /executions/{execution_id}
pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionStatus>, ApiError> {
    Ok(Json(state.triggers.status(&execution_id).await?))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
