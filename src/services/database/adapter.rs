// Source driver abstraction and registry
use crate::api::middleware::AppError;
use crate::models::{SourceType, TableMetadata};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Query execution result
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(rows: Vec<Value>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            row_count,
            execution_time_ms,
        }
    }
}

/// Source driver trait - one implementation per supported source type.
/// Drivers own their connections; callers only invoke these two capabilities.
#[async_trait::async_trait]
pub trait SourceDriver: Send + Sync {
    /// Read the source catalog as raw table metadata
    async fn introspect(&self, source_id: &str) -> Result<Vec<TableMetadata>, AppError>;

    /// Execute a native query and return rows as JSON objects keyed by the
    /// projected column names
    async fn query(&self, source_id: &str, native_query: &str) -> Result<QueryResult, AppError>;

    /// Source type this driver speaks
    fn source_type(&self) -> SourceType;
}

/// A registered data source
#[derive(Clone)]
pub struct RegisteredSource {
    pub id: String,
    pub name: Option<String>,
    pub source_type: SourceType,
    pub driver: Arc<dyn SourceDriver>,
}

/// Maps data source ids to the driver that serves them.
/// Constructed explicitly and handed to the services that need it.
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, RegisteredSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, id: impl Into<String>, name: Option<String>, driver: Arc<dyn SourceDriver>) {
        let id = id.into();
        let source = RegisteredSource {
            id: id.clone(),
            name,
            source_type: driver.source_type(),
            driver,
        };
        tracing::info!("Registered {} source '{}'", source.source_type.as_str(), id);
        self.sources.write().await.insert(id, source);
    }

    pub async fn unregister(&self, id: &str) -> Option<RegisteredSource> {
        self.sources.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Result<RegisteredSource, AppError> {
        self.sources
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Data source '{}' is not registered", id)))
    }

    pub async fn driver(&self, id: &str) -> Result<Arc<dyn SourceDriver>, AppError> {
        Ok(self.get(id).await?.driver)
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::DocumentDriver;

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = SourceRegistry::new();
        registry
            .register("docs", Some("Uploads".to_string()), Arc::new(DocumentDriver::new()))
            .await;

        let source = registry.get("docs").await.unwrap();
        assert_eq!(source.source_type, SourceType::Document);
        assert_eq!(registry.ids().await, vec!["docs".to_string()]);

        assert!(matches!(registry.get("missing").await, Err(AppError::NotFound(_))));
        assert!(registry.unregister("docs").await.is_some());
        assert!(registry.driver("docs").await.is_err());
    }
}
