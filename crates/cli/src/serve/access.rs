//! POST /access/check

use axum::extract::rejection::JsonRejection;
use axum::Json;
use bobbin_access::{PermissionResolver, Requirement, SessionContext};
use serde::Deserialize;
use serde_json::{json, Value};

use super::handlers::ApiError;

/// Exactly one of `resource`, `menu` + `action`, or `role` is evaluated.
#[derive(Debug, Deserialize)]
pub(crate) struct CheckBody {
    session: SessionContext,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    menu: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    role: Option<Requirement>,
}

pub(crate) async fn handle_check(
    body: Result<Json<CheckBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let resolver = PermissionResolver::new(&body.session);
    let allowed = match (&body.resource, &body.menu, &body.action, body.role) {
        (Some(resource), None, None, None) => resolver.has_resource(resource),
        (None, Some(menu), Some(action), None) => resolver.has_action(menu, action),
        (None, None, None, Some(role)) => resolver.has_permission(role),
        _ => {
            return Err(ApiError::bad_request(
                "give exactly one of resource, menu and action, or role",
            ))
        }
    };
    Ok(Json(json!({ "allowed": allowed })))
}
