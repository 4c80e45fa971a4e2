use axum::{extract::State, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{CompileQueryRequest, CompiledPlan, ExecuteQueryRequest, TabularResult};

/// Compile a descriptor and run it against its sources
pub async fn execute_query(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteQueryRequest>,
) -> Result<Json<TabularResult>, AppError> {
    let tenant_id = payload.tenant_id.trim();
    if tenant_id.is_empty() {
        return Err(AppError::Validation("tenant_id cannot be empty".to_string()));
    }

    let result = state.service.compile_and_execute(&payload.descriptor, tenant_id).await?;
    tracing::info!(
        "Query for tenant '{}' returned {} rows in {}ms",
        tenant_id,
        result.row_count,
        result.execution_time_ms
    );
    Ok(Json(result))
}

/// Compile without executing, for previewing the native queries
pub async fn compile_query(
    State(state): State<AppState>,
    Json(payload): Json<CompileQueryRequest>,
) -> Result<Json<CompiledPlan>, AppError> {
    Ok(Json(state.service.compile(&payload.descriptor).await?))
}
