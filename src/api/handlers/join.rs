use axum::{extract::State, http::StatusCode, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{JoinDefinition, SuggestionRequest};

/// Ranked join candidates for a pair of tables
pub async fn suggest_joins(
    State(state): State<AppState>,
    Json(payload): Json<SuggestionRequest>,
) -> Json<serde_json::Value> {
    let suggestions = state.service.suggestions(&payload.left, &payload.right).await;
    Json(serde_json::json!({ "suggestions": suggestions }))
}

/// Record a confirmed join in the catalog
pub async fn save_join(
    State(state): State<AppState>,
    Json(payload): Json<JoinDefinition>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    for side in [&payload.left, &payload.right] {
        if side.data_source_id.is_empty() || side.table.is_empty() || side.column.is_empty() {
            return Err(AppError::Validation(
                "Both join sides need a data source, table and column".to_string(),
            ));
        }
    }

    let entry = state.service.save_join(&payload).await?;
    tracing::info!(
        "Saved join {}.{} = {}.{} (usage {})",
        entry.left.table,
        entry.left.column,
        entry.right.table,
        entry.right.column,
        entry.usage_count
    );

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "entry": entry }))))
}
