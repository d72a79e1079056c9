//! Shared handler plumbing: health, fallback, caller identity, error mapping.

use std::convert::Infallible;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bobbin_access::{roles_satisfy, Requirement, SUPER_ROLE, TENANT_ADMIN_ROLE};
use bobbin_storage::ServiceError;
use bobbin_workflow::Operator;

use super::json_error;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not_found", "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// Operator identity taken from `X-Operator` and `X-Roles` (comma separated).
///
/// These headers are trusted as sent. They are expected to be set by a
/// gateway that has already authenticated the user, and the server only
/// accepts them from callers holding `BOBBIN_API_KEY` when one is
/// configured. Without an API key any client can claim any role.
pub(crate) struct Caller(pub(crate) Operator);

impl Caller {
    fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let id = header("x-operator").unwrap_or("anonymous");
        let roles = header("x-roles")
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Caller(Operator::new(id, roles))
    }

    /// Designer mutations need `admin` or `tenant_admin`; `super` always passes.
    pub(crate) fn require_designer(&self) -> Result<(), ApiError> {
        let requirement = Requirement::any_of(["admin", TENANT_ADMIN_ROLE, SUPER_ROLE]);
        if roles_satisfy(&self.0.roles, &requirement) {
            Ok(())
        } else {
            Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "unauthorized",
                format!(
                    "operator '{}' may not modify workflow definitions",
                    self.0.id
                ),
            ))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller::from_headers(&parts.headers))
    }
}

/// Error body `{error, kind}` with the status its kind maps to.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "malformed_input", message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        let status = match kind {
            "unauthorized" => StatusCode::FORBIDDEN,
            "no_matching_transition" | "condition_not_met" | "invalid_rollback_target"
            | "conflict" => StatusCode::CONFLICT,
            "malformed_input" | "invalid_definition" => StatusCode::BAD_REQUEST,
            "instance_not_found" | "definition_not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind, error = %err, "request failed");
        } else {
            tracing::debug!(kind, error = %err, "request refused");
        }
        Self::new(status, kind, err.to_string())
    }
}

/// Bodies that fail to parse or deserialize are malformed input.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_error(self.status, self.kind, &self.message).into_response()
    }
}
