//! Workflow designer routes: definition CRUD, activation, templates and
//! instance lookup.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use bobbin_storage::Target;
use bobbin_workflow::{
    templates, Metadata, TransitionRequest, WorkflowDefinition, WorkflowInstance,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::handlers::{ApiError, Caller};
use super::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

/// GET /workflow/designer/definitions?page=&page_size=
pub(crate) async fn handle_list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let page = query.page.filter(|p| *p > 0).unwrap_or(1);
    let page_size = query
        .page_size
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let (workflows, total) = state.workflows.list_definitions(page, page_size).await?;
    Ok(Json(json!({ "workflows": workflows, "total": total })))
}

/// POST /workflow/designer/definitions
pub(crate) async fn handle_create(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    definition: Result<Json<WorkflowDefinition>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    caller.require_designer()?;
    let Json(definition) = definition?;
    let (definition, report) = state
        .workflows
        .create_definition(definition, &caller.0.id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "definition": definition, "warnings": report.warnings })),
    ))
}

/// GET /workflow/designer/definitions/{id}
pub(crate) async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    Ok(Json(state.workflows.get_definition(&id).await?))
}

/// PUT /workflow/designer/definitions/{id}
pub(crate) async fn handle_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    caller: Caller,
    definition: Result<Json<WorkflowDefinition>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    caller.require_designer()?;
    let Json(definition) = definition?;
    let (definition, report) = state
        .workflows
        .update_definition(&id, definition, &caller.0.id)
        .await?;
    Ok(Json(
        json!({ "definition": definition, "warnings": report.warnings }),
    ))
}

/// DELETE /workflow/designer/definitions/{id}
pub(crate) async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<Json<Value>, ApiError> {
    caller.require_designer()?;
    state.workflows.delete_definition(&id).await?;
    Ok(Json(json!({ "message": "deleted" })))
}

/// POST /workflow/designer/definitions/{id}/activate
pub(crate) async fn handle_activate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<Json<Value>, ApiError> {
    caller.require_designer()?;
    state.workflows.activate(&id).await?;
    Ok(Json(json!({ "message": "activated" })))
}

/// POST /workflow/designer/definitions/{id}/deactivate
pub(crate) async fn handle_deactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    caller: Caller,
) -> Result<Json<Value>, ApiError> {
    caller.require_designer()?;
    state.workflows.deactivate(&id).await?;
    Ok(Json(json!({ "message": "deactivated" })))
}

/// GET /workflow/designer/templates
pub(crate) async fn handle_templates() -> Json<Value> {
    Json(json!({ "templates": templates::all() }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstanceQuery {
    #[serde(default)]
    entity_type: String,
    #[serde(default)]
    entity_id: String,
}

/// GET /workflow/designer/instances?entity_type=&entity_id=
pub(crate) async fn handle_instance(
    State(state): State<Arc<AppState>>,
    query: Result<Query<InstanceQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    if query.entity_type.is_empty() || query.entity_id.is_empty() {
        return Err(ApiError::bad_request(
            "entity_type and entity_id are required",
        ));
    }
    let instance_id = WorkflowInstance::key_for(&query.entity_type, &query.entity_id);
    let instance = state.workflows.instance_by_id(&instance_id).await?;
    Ok(Json(json!(instance)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteBody {
    instance_id: String,
    event: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// POST /workflow/designer/transition
pub(crate) async fn handle_transition(
    State(state): State<Arc<AppState>>,
    Caller(operator): Caller,
    body: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let instance = state.workflows.instance_by_id(&body.instance_id).await?;
    let mut request = TransitionRequest::new(body.event, operator).with_reason(body.reason);
    request.metadata = body.metadata.unwrap_or_default();

    let outcome = state
        .workflows
        .transition(
            Target {
                workflow: &instance.workflow_code,
                entity_type: &instance.entity_type,
                entity_id: &instance.entity_id,
            },
            &request,
        )
        .await?;
    Ok(Json(json!({
        "message": "transition applied",
        "instance": outcome.instance,
    })))
}
