//! Router assembly.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let workflow_routes = Router::new()
        .route("/", post(handlers::create_workflow))
        .route("/", get(handlers::list_workflows))
        .route("/{trigger}", get(handlers::get_workflow))
        .route("/{trigger}/status", put(handlers::update_workflow_status))
        .route("/{trigger}/trigger", post(handlers::trigger_workflow))
        .with_state(state.clone());

    let execution_routes = Router::new()
        .route("/{execution_id}", get(handlers::get_execution))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(handlers::health))
        .with_state(state)
        .nest("/workflows", workflow_routes)
        .nest("/executions", execution_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
