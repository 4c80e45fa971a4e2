use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::plan::ColumnDescriptor;

/// One result row keyed by column name
pub type Row = Map<String, Value>;

/// Unified result returned to callers for single-source and federated plans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularResult {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    /// True when the tenant row limit cut the result short
    pub truncated: bool,
    pub federated: bool,
    pub execution_time_ms: u128,
    pub executed_at: DateTime<Utc>,
}

impl TabularResult {
    pub fn new(
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Row>,
        truncated: bool,
        federated: bool,
        execution_time_ms: u128,
    ) -> Self {
        let row_count = rows.len();

        Self {
            columns,
            rows,
            row_count,
            truncated,
            federated,
            execution_time_ms,
            executed_at: Utc::now(),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Truncates `rows` to the tenant limit (-1 = unlimited), returning whether
/// anything was dropped
pub fn apply_row_limit<T>(rows: &mut Vec<T>, row_limit: i64) -> bool {
    if row_limit < 0 {
        return false;
    }
    let limit = row_limit as usize;
    if rows.len() > limit {
        rows.truncate(limit);
        true
    } else {
        false
    }
}
