use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers::{join, query, source, AppState};
use crate::config::Config;
use crate::services::ModelService;

/// Create router with application state
pub fn create_router_with_state(service: Arc<ModelService>, config: Config) -> Router {
    let state = AppState { service, config };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/joins", post(join::save_join))
        .route("/api/joins/suggestions", post(join::suggest_joins))
        .route("/api/queries/execute", post(query::execute_query))
        .route("/api/queries/compile", post(query::compile_query))
        .route("/api/sources", get(source::list_sources))
        .route("/api/sources/{id}", delete(source::delete_source))
        .route("/api/sources/{id}/schema-hash", get(source::get_schema_hash))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
