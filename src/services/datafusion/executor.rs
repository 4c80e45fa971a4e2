// DataFusion QueryExecutor
//
// Runs one native statement against a prepared SessionContext and hands the
// result back as JSON rows.

use anyhow::{anyhow, Context, Result};
use datafusion::arrow::array::RecordBatch;
use datafusion::prelude::*;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::services::database::QueryResult;
use crate::services::datafusion::DataFusionResultConverter;

/// Executes SQL in a DataFusion context with a timeout
pub struct DataFusionQueryExecutor {
    ctx: SessionContext,
    default_timeout: Duration,
}

impl DataFusionQueryExecutor {
    pub fn new(ctx: SessionContext, default_timeout: Duration) -> Self {
        Self { ctx, default_timeout }
    }

    /// Execute a SQL statement and collect its batches
    ///
    /// # Errors
    /// Returns error if planning fails, execution fails, or the timeout elapses
    pub async fn collect(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        timeout(self.default_timeout, async {
            let df = self
                .ctx
                .sql(sql)
                .await
                .with_context(|| format!("Failed to plan SQL: {}", sql))?;
            df.collect().await.context("Failed to execute query")
        })
        .await
        .map_err(|_| anyhow!("Query execution timeout after {:?}", self.default_timeout))?
    }

    /// Execute a SQL statement and convert the result to JSON rows
    pub async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start_time = Instant::now();
        let batches = self.collect(sql).await?;
        let rows = DataFusionResultConverter::batches_to_rows(&batches)?;
        let elapsed = start_time.elapsed().as_millis() as u64;

        tracing::debug!("DataFusion returned {} rows in {}ms", rows.len(), elapsed);
        Ok(QueryResult::new(rows, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::datafusion::DataFusionSessionManager;
    use serde_json::json;

    #[tokio::test]
    async fn test_execute_simple_query() {
        let ctx = DataFusionSessionManager::default_config().create_session().unwrap();
        let executor = DataFusionQueryExecutor::new(ctx, Duration::from_secs(5));

        let result = executor.execute_query("SELECT 1 AS \"n\"").await.unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["n"], json!(1));
    }

    #[tokio::test]
    async fn test_invalid_sql_is_an_error() {
        let ctx = DataFusionSessionManager::default_config().create_session().unwrap();
        let executor = DataFusionQueryExecutor::new(ctx, Duration::from_secs(5));

        assert!(executor.execute_query("SELECT * FROM missing_table").await.is_err());
    }
}
