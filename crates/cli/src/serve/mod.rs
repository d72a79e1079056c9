//! `bobbin serve` -- HTTP JSON API over the workflow and access engines.
//!
//! Definitions and instances live in a [`MemoryStore`]; the `basic_order`
//! template is installed and activated at startup, followed by any
//! definition files given on the command line.
//!
//! Security features:
//! - CORS headers on all responses (permissive for local dev)
//! - Per-IP rate limiting (default: 120 req/min, `BOBBIN_RATE_LIMIT`)
//! - Optional API key authentication via `BOBBIN_API_KEY`
//!
//! Caller identity comes from the `X-Operator` and `X-Roles` headers and is
//! not verified here. Deploy behind a gateway that sets them, with
//! `BOBBIN_API_KEY` configured so only that gateway reaches the server.
//!
//! Endpoints:
//! - GET    /health                                  - Server status (exempt from auth)
//! - GET    /workflow/definition                     - Legacy view of the order workflow
//! - GET    /workflow/mermaid                        - Mermaid diagram of the order workflow
//! - GET    /workflow/rules                          - Flat transition rules
//! - GET    /workflow/orders/{id}/status             - Current state of an order
//! - GET    /workflow/orders/{id}/history            - Newest-first history (?limit=, default 20)
//! - GET    /workflow/orders/{id}/rollbacks          - Newest-first rollbacks (?limit=, default 10)
//! - GET    /workflow/orders/{id}/transitions        - Transitions available to the caller
//! - POST   /workflow/transition                     - Apply an event to an order
//! - POST   /workflow/rollback                       - Roll an order back
//! - GET    /workflow/designer/definitions           - Paged definition list
//! - POST   /workflow/designer/definitions           - Create a definition
//! - GET    /workflow/designer/definitions/{id}      - One definition
//! - PUT    /workflow/designer/definitions/{id}      - Replace a definition
//! - DELETE /workflow/designer/definitions/{id}      - Delete a definition
//! - POST   /workflow/designer/definitions/{id}/activate
//! - POST   /workflow/designer/definitions/{id}/deactivate
//! - GET    /workflow/designer/templates             - Built-in templates
//! - GET    /workflow/designer/instances             - Instance by entity_type + entity_id
//! - POST   /workflow/designer/transition            - Apply an event to an instance by id
//! - POST   /access/check                            - Evaluate the permission resolver
//!
//! Callers identify themselves with `X-Operator` and `X-Roles` headers.
//! Errors are `{"error": ..., "kind": ...}`.

mod access;
mod designer;
mod handlers;
mod middleware;
mod orders;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use bobbin_storage::{MemoryStore, WorkflowService};
use bobbin_workflow::{templates, WorkflowDefinition};
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{handle_health, handle_not_found};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};

/// Maximum request body size: 2 MB.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Default rate limit: 120 requests per minute per IP.
const DEFAULT_RATE_LIMIT: u64 = 120;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Author recorded on definitions installed at startup.
const STARTUP_AUTHOR: &str = "system";

fn json_error(status: StatusCode, kind: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"error": message, "kind": kind})),
    )
}

/// Start the HTTP server on the given port.
///
/// Definition files are installed and activated after the built-in
/// template, so a file with code `basic_order` replaces it as the active
/// order workflow. Files that fail to load or validate are skipped with a
/// warning.
pub async fn start_server(
    port: u16,
    definition_paths: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let workflows = WorkflowService::new(Arc::new(MemoryStore::new()));

    let builtin = workflows
        .install(templates::basic_order(), STARTUP_AUTHOR)
        .await?;
    tracing::info!(code = %builtin.code, id = %builtin.id, "installed built-in template");

    for path in &definition_paths {
        let installed = match WorkflowDefinition::load(path) {
            Ok(definition) => workflows.install(definition, STARTUP_AUTHOR).await,
            Err(e) => Err(e.into()),
        };
        match installed {
            Ok(definition) => tracing::info!(
                code = %definition.code,
                id = %definition.id,
                path = %path.display(),
                "loaded workflow definition"
            ),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping definition"),
        }
    }

    let rate_limit = std::env::var("BOBBIN_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT);

    let api_key = std::env::var("BOBBIN_API_KEY")
        .ok()
        .filter(|k| !k.is_empty());

    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("BOBBIN_API_KEY is not set; X-Operator and X-Roles are trusted from any client");
    }
    tracing::info!(rate_limit, "requests per minute per IP");

    let state = Arc::new(AppState {
        workflows,
        order_workflow: templates::BASIC_ORDER.to_string(),
        rate_limiter: RateLimiter::new(rate_limit),
        api_key,
    });

    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("bobbin listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let designer = Router::new()
        .route(
            "/definitions",
            get(designer::handle_list).post(designer::handle_create),
        )
        .route(
            "/definitions/{id}",
            get(designer::handle_get)
                .put(designer::handle_update)
                .delete(designer::handle_delete),
        )
        .route("/definitions/{id}/activate", post(designer::handle_activate))
        .route(
            "/definitions/{id}/deactivate",
            post(designer::handle_deactivate),
        )
        .route("/templates", get(designer::handle_templates))
        .route("/instances", get(designer::handle_instance))
        .route("/transition", post(designer::handle_transition));

    Router::new()
        .route("/health", get(handle_health))
        .route("/workflow/definition", get(orders::handle_definition))
        .route("/workflow/mermaid", get(orders::handle_mermaid))
        .route("/workflow/rules", get(orders::handle_rules))
        .route("/workflow/orders/{id}/status", get(orders::handle_status))
        .route("/workflow/orders/{id}/history", get(orders::handle_history))
        .route(
            "/workflow/orders/{id}/rollbacks",
            get(orders::handle_rollbacks),
        )
        .route(
            "/workflow/orders/{id}/transitions",
            get(orders::handle_transitions),
        )
        .route("/workflow/transition", post(orders::handle_transition))
        .route("/workflow/rollback", post(orders::handle_rollback))
        .nest("/workflow/designer", designer)
        .route("/access/check", post(access::handle_check))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
