//! Order workflow routes: the legacy `/workflow/*` contract.
//!
//! Orders are instances of the active `basic_order` workflow with entity
//! type `order` and the order id as entity id.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use bobbin_storage::Target;
use bobbin_workflow::{legacy, Metadata, StateKey, TransitionRequest};
use serde::Deserialize;
use serde_json::{json, Value};

use super::handlers::{ApiError, Caller};
use super::state::AppState;

const ORDER_ENTITY: &str = "order";
const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_ROLLBACK_LIMIT: usize = 10;

fn order<'a>(state: &'a AppState, order_id: &'a str) -> Target<'a> {
    Target {
        workflow: &state.order_workflow,
        entity_type: ORDER_ENTITY,
        entity_id: order_id,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LimitQuery {
    limit: Option<usize>,
}

/// GET /workflow/definition
pub(crate) async fn handle_definition(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let definition = state
        .workflows
        .active_definition(&state.order_workflow)
        .await?;
    Ok(Json(legacy::definition_view(&definition)))
}

/// GET /workflow/mermaid
pub(crate) async fn handle_mermaid(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let definition = state
        .workflows
        .active_definition(&state.order_workflow)
        .await?;
    Ok(Json(json!({ "diagram": legacy::mermaid(&definition) })))
}

/// GET /workflow/rules
pub(crate) async fn handle_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let definition = state
        .workflows
        .active_definition(&state.order_workflow)
        .await?;
    Ok(Json(json!({ "rules": legacy::transition_rules(&definition) })))
}

/// GET /workflow/orders/{id}/status
pub(crate) async fn handle_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let definition = state
        .workflows
        .active_definition(&state.order_workflow)
        .await?;
    let status = state
        .workflows
        .current_state(order(&state, &order_id))
        .await?;
    Ok(Json(json!({
        "order_id": order_id,
        "status": status,
        "status_name": definition.state_label(&status),
    })))
}

/// GET /workflow/orders/{id}/history?limit=N
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state
        .workflows
        .history(order(&state, &order_id), limit)
        .await?;
    Ok(Json(json!({ "order_id": order_id, "history": history })))
}

/// GET /workflow/orders/{id}/rollbacks?limit=N
pub(crate) async fn handle_rollbacks(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_ROLLBACK_LIMIT);
    let rollbacks = match state.workflows.instance(order(&state, &order_id)).await {
        Ok(instance) => instance.recent_rollbacks(limit),
        Err(bobbin_storage::ServiceError::InstanceNotFound { .. }) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(json!({ "order_id": order_id, "rollbacks": rollbacks })))
}

/// GET /workflow/orders/{id}/transitions
pub(crate) async fn handle_transitions(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Caller(operator): Caller,
) -> Result<Json<Value>, ApiError> {
    let transitions = state
        .workflows
        .available_transitions(order(&state, &order_id), &operator, &Metadata::new())
        .await?;
    Ok(Json(json!({ "order_id": order_id, "transitions": transitions })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody {
    order_id: String,
    event: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// POST /workflow/transition
pub(crate) async fn handle_transition(
    State(state): State<Arc<AppState>>,
    Caller(operator): Caller,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    if body.order_id.is_empty() {
        return Err(ApiError::bad_request("order_id must be non-empty"));
    }
    let mut request = TransitionRequest::new(body.event, operator).with_reason(body.reason);
    request.metadata = body.metadata.unwrap_or_default();

    let outcome = state
        .workflows
        .transition(order(&state, &body.order_id), &request)
        .await?;
    Ok(Json(json!({
        "message": "transition applied",
        "status": outcome.instance.current_state,
        "updated_fields": outcome.receipt.updated_fields,
        "directives": outcome.receipt.directives,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RollbackBody {
    order_id: String,
    reason: String,
    /// Defaults to reversing the most recent transition.
    #[serde(default)]
    to_state: Option<StateKey>,
}

/// POST /workflow/rollback
pub(crate) async fn handle_rollback(
    State(state): State<Arc<AppState>>,
    Caller(operator): Caller,
    body: Result<Json<RollbackBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    if body.order_id.is_empty() {
        return Err(ApiError::bad_request("order_id must be non-empty"));
    }
    let instance = state
        .workflows
        .rollback(
            order(&state, &body.order_id),
            body.to_state.as_ref(),
            &operator,
            &body.reason,
        )
        .await?;
    Ok(Json(json!({
        "message": "rollback applied",
        "status": instance.current_state,
    })))
}
