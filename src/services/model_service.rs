// Data model service
//
// The surface the HTTP layer talks to. Wires the registry, catalog reader,
// hash tracker, join catalog, candidate generator, compiler, coordinator and
// tenant limits together; every collaborator is handed in at construction.

use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::models::{
    CompiledPlan, JoinCatalogEntry, JoinDefinition, JoinSuggestion, QueryDescriptor, TableMetadata, TableRef,
    TabularResult,
};
use crate::services::catalog_reader::SchemaCatalogReader;
use crate::services::compiler::QueryCompiler;
use crate::services::database::{SourceDriver, SourceRegistry};
use crate::services::execution::ExecutionCoordinator;
use crate::services::join_suggestions::{JoinCandidateGenerator, SuggestionConfig};
use crate::services::schema_hash::{hash_for_schema, SchemaHashTracker};
use crate::services::tenant::TenantLimits;
use crate::storage::JoinCatalogStore;

pub struct ModelService {
    registry: Arc<SourceRegistry>,
    reader: Arc<SchemaCatalogReader>,
    hashes: SchemaHashTracker,
    catalog: JoinCatalogStore,
    generator: JoinCandidateGenerator,
    coordinator: ExecutionCoordinator,
    tenants: Arc<dyn TenantLimits>,
}

impl ModelService {
    pub fn new(
        registry: Arc<SourceRegistry>,
        catalog: JoinCatalogStore,
        tenants: Arc<dyn TenantLimits>,
        suggestions: SuggestionConfig,
        fetch_timeout: Duration,
    ) -> Self {
        let reader = Arc::new(SchemaCatalogReader::new(registry.clone()));
        Self {
            hashes: SchemaHashTracker::new(reader.clone()),
            reader,
            catalog,
            generator: JoinCandidateGenerator::new(suggestions),
            coordinator: ExecutionCoordinator::new(registry.clone(), fetch_timeout),
            tenants,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Register a source with the registry and the join catalog
    pub async fn add_source(
        &self,
        id: &str,
        name: Option<String>,
        driver: Arc<dyn SourceDriver>,
    ) -> Result<(), AppError> {
        let source_type = driver.source_type();
        self.catalog
            .register_source(id, name.as_deref(), source_type.as_str())
            .await?;
        self.registry.register(id, name, driver).await;
        Ok(())
    }

    /// Unregister a source and drop every catalog entry referencing it.
    /// Returns the number of catalog entries removed.
    pub async fn remove_source(&self, id: &str) -> Result<usize, AppError> {
        let registered = self.registry.unregister(id).await.is_some();
        let removed = self.catalog.delete_source(id).await?;
        if !registered && removed == 0 {
            return Err(AppError::NotFound(format!("Data source '{}' is not registered", id)));
        }
        Ok(removed)
    }

    pub async fn schema_hash(&self, source_id: &str, schema: Option<&str>) -> Result<String, AppError> {
        self.hashes.generate_schema_hash(source_id, schema).await
    }

    pub async fn has_schema_changed(
        &self,
        source_id: &str,
        previous_hash: &str,
        schema: Option<&str>,
    ) -> Result<bool, AppError> {
        self.hashes.has_schema_changed(source_id, previous_hash, schema).await
    }

    /// A table together with the current hash of its schema
    async fn table_with_hash(&self, table: &TableRef) -> Result<(TableMetadata, String), AppError> {
        let tables = self.reader.introspect(&table.data_source_id).await?;
        let hash = hash_for_schema(&tables, &table.schema);
        let found = tables
            .into_iter()
            .find(|t| t.matches(&table.data_source_id, &table.schema, &table.table))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Table {}.{} not found in source '{}'",
                    table.schema, table.table, table.data_source_id
                ))
            })?;
        Ok((found, hash))
    }

    async fn try_suggestions(&self, left: &TableRef, right: &TableRef) -> Result<Vec<JoinSuggestion>, AppError> {
        let (left_table, left_hash) = self.table_with_hash(left).await?;
        let (right_table, right_hash) = self.table_with_hash(right).await?;

        let entries = self.catalog.entries_for_pair(left, right).await?;
        let catalog = self.generator.catalog_suggestions(&entries, &left_hash, &right_hash);
        if catalog.len() < entries.len() {
            tracing::info!(
                "{} catalog entries for {} / {} skipped after schema changes",
                entries.len() - catalog.len(),
                left.table,
                right.table
            );
        }

        Ok(self.generator.combine(catalog, &left_table, &right_table))
    }

    /// Ranked join suggestions for a table pair. Never fails: missing or
    /// unreachable metadata yields an empty list.
    pub async fn suggestions(&self, left: &TableRef, right: &TableRef) -> Vec<JoinSuggestion> {
        match self.try_suggestions(left, right).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                tracing::warn!(
                    "No join suggestions for {}.{} / {}.{}: {}",
                    left.data_source_id,
                    left.table,
                    right.data_source_id,
                    right.table,
                    e
                );
                Vec::new()
            }
        }
    }

    /// Record a confirmed join, stamped with the current schema hashes
    pub async fn save_join(&self, definition: &JoinDefinition) -> Result<JoinCatalogEntry, AppError> {
        let (left_table, left_hash) = self.table_with_hash(&definition.left.table_ref()).await?;
        let (right_table, right_hash) = self.table_with_hash(&definition.right.table_ref()).await?;

        for (table, column) in [(&left_table, &definition.left.column), (&right_table, &definition.right.column)] {
            if table.column(column).is_none() {
                return Err(AppError::Validation(format!(
                    "Column '{}' does not exist on {}",
                    column,
                    table.qualified_name()
                )));
            }
        }

        Ok(self.catalog.save_join(definition, &left_hash, &right_hash).await?)
    }

    /// Introspect every source the descriptor touches and compile it
    pub async fn compile(&self, descriptor: &QueryDescriptor) -> Result<CompiledPlan, AppError> {
        let sources: Vec<String> = descriptor.data_source_ids().into_iter().collect();
        let metadata = try_join_all(sources.iter().map(|id| async move {
            self.reader.introspect(id).await.map_err(|e| match e {
                AppError::NotFound(_) => AppError::Compilation(format!("Unknown data source '{}'", id)),
                other => other,
            })
        }))
        .await?;

        let metadata: Vec<TableMetadata> = metadata.into_iter().flatten().collect();
        QueryCompiler::new(&metadata).compile(descriptor)
    }

    pub async fn compile_and_execute(
        &self,
        descriptor: &QueryDescriptor,
        tenant_id: &str,
    ) -> Result<TabularResult, AppError> {
        let row_limit = self.tenants.row_limit(tenant_id).await?;
        let plan = self.compile(descriptor).await?;
        tracing::info!(
            "Executing {} plan for tenant '{}' (row limit {})",
            if plan.is_federated() { "federated" } else { "single-source" },
            tenant_id,
            row_limit
        );
        self.coordinator.execute(&plan, row_limit).await
    }
}
