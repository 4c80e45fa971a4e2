use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// A data source could not be reached during introspection or fetch
    #[error("Connection error: {0}")]
    Connection(String),

    /// The descriptor references something that does not exist, or asks for
    /// a join that cannot be compiled
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// The cross-source join combination cannot be merged in memory
    #[error("Merge semantics error: {0}")]
    MergeSemantics(String),

    /// One sub-plan of a federated query failed, so the whole query failed
    #[error("Sub-query on source '{source_id}' failed: {message}")]
    PartialExecution { source_id: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Annotates a driver or introspection error with the source it came from
    pub fn for_source(self, source_id: &str) -> AppError {
        match self {
            AppError::Connection(msg) => AppError::Connection(format!("[source {}] {}", source_id, msg)),
            AppError::Database(msg) => AppError::Database(format!("[source {}] {}", source_id, msg)),
            other => other,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::Compilation(_) => "COMPILATION_ERROR",
            AppError::MergeSemantics(_) => "MERGE_SEMANTICS_ERROR",
            AppError::PartialExecution { .. } => "PARTIAL_EXECUTION_FAILURE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::InvalidSql(_) => "INVALID_SQL",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_detail) = match self {
            AppError::Connection(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(code, msg)
                    .with_details("The data source is unreachable. Retry once it is available again."),
            ),
            AppError::Compilation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(code, msg)
                    .with_details("Fix the data model definition; the query was not executed."),
            ),
            AppError::MergeSemantics(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(code, msg)
                    .with_details("Cross-source joins support equality keys combined with AND only."),
            ),
            AppError::PartialExecution { source_id, message } => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(code, message).with_details(format!("Failing source: {}", source_id)),
            ),
            AppError::Database(msg) => {
                let enhanced_msg = if msg.contains("does not exist") {
                    format!("{} The source structure may have changed; refresh its schema.", msg)
                } else if msg.contains("timeout") {
                    format!("{} Consider narrowing the model or checking source performance.", msg)
                } else {
                    msg
                };
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetail::new(code, enhanced_msg))
            }
            AppError::InvalidSql(msg) => (StatusCode::BAD_REQUEST, ErrorDetail::new(code, msg)),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorDetail::new(code, msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorDetail::new(code, msg)),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetail::new(code, msg)),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

/// Convert rusqlite::Error to AppError
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
