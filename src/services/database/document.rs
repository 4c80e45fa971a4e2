// Document collection driver
//
// Holds JSON document collections in memory and answers native SQL through an
// embedded DataFusion context. Collections live in the `public` schema; the
// column set of each collection is derived from its documents on every call.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::api::middleware::AppError;
use crate::models::{SourceType, TableMetadata, TableType};
use crate::services::catalog_reader::columns_from_documents;
use crate::services::database::adapter::{QueryResult, SourceDriver};
use crate::services::datafusion::{DataFusionQueryExecutor, DataFusionResultConverter, DataFusionSessionManager};

pub const DOCUMENT_SCHEMA: &str = "public";

pub struct DocumentDriver {
    collections: RwLock<BTreeMap<String, Vec<Value>>>,
    sessions: DataFusionSessionManager,
    timeout: Duration,
}

impl DocumentDriver {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            sessions: DataFusionSessionManager::default_config(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load collections from a JSON file shaped `{ "collection": [doc, ...] }`
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Connection(format!("Cannot read {}: {}", path.display(), e)))?;
        let parsed: BTreeMap<String, Vec<Value>> = serde_json::from_str(&content)
            .map_err(|e| AppError::Validation(format!("Invalid document file {}: {}", path.display(), e)))?;

        tracing::info!("Loaded {} document collections from {}", parsed.len(), path.display());
        Ok(Self {
            collections: RwLock::new(parsed),
            ..Self::new()
        })
    }

    /// Insert or replace a collection
    pub async fn insert_collection(&self, name: impl Into<String>, documents: Vec<Value>) {
        self.collections.write().await.insert(name.into(), documents);
    }

    fn describe(source_id: &str, name: &str, documents: &[Value]) -> TableMetadata {
        let mut table = TableMetadata::new(source_id, SourceType::Document, DOCUMENT_SCHEMA, name, TableType::Collection);
        table.columns = columns_from_documents(&table, documents);
        table
    }
}

impl Default for DocumentDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceDriver for DocumentDriver {
    async fn introspect(&self, source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        let collections = self.collections.read().await;
        Ok(collections
            .iter()
            .map(|(name, docs)| Self::describe(source_id, name, docs))
            .collect())
    }

    async fn query(&self, source_id: &str, native_query: &str) -> Result<QueryResult, AppError> {
        let ctx = self.sessions.create_session()?;

        {
            let collections = self.collections.read().await;
            for (name, docs) in collections.iter() {
                let table = Self::describe(source_id, name, docs);
                let batch = DataFusionResultConverter::documents_to_batch(docs, &table.columns)?;
                ctx.register_batch(name.as_str(), batch)
                    .map_err(|e| AppError::Database(format!("Failed to register collection '{}': {}", name, e)))?;
            }
        }

        tracing::debug!("Document query on '{}': {}", source_id, native_query);
        DataFusionQueryExecutor::new(ctx, self.timeout)
            .execute_query(native_query)
            .await
            .map_err(|e| AppError::Database(format!("{:#}", e)))
    }

    fn source_type(&self) -> SourceType {
        SourceType::Document
    }
}
