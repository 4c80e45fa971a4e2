use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::services::ModelService;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ModelService>,
    pub config: Config,
}

#[derive(Debug, Deserialize)]
pub struct SchemaHashParams {
    pub schema: Option<String>,
}

/// List registered data source ids
pub async fn list_sources(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sources = state.service.registry().ids().await;
    Json(serde_json::json!({ "sources": sources }))
}

/// Current schema hash of a source, optionally narrowed to one schema
pub async fn get_schema_hash(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SchemaHashParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let hash = state.service.schema_hash(&id, params.schema.as_deref()).await?;

    Ok(Json(serde_json::json!({
        "source_id": id,
        "schema": params.schema,
        "hash": hash,
    })))
}

/// Unregister a source; its join catalog entries go with it
pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let removed = state.service.remove_source(&id).await?;
    tracing::info!("Removed source '{}' and {} catalog entries", id, removed);
    Ok(StatusCode::NO_CONTENT)
}
