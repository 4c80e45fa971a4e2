// Schema Hash Tracker
//
// Structural fingerprints per (data source, schema). Join suggestions taken
// from the catalog are only trusted while both sides still hash to the value
// recorded when the join was confirmed.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::TableMetadata;
use crate::services::catalog_reader::SchemaCatalogReader;

pub struct SchemaHashTracker {
    reader: Arc<SchemaCatalogReader>,
}

impl SchemaHashTracker {
    pub fn new(reader: Arc<SchemaCatalogReader>) -> Self {
        Self { reader }
    }

    /// Introspect the source and hash it, restricted to `schema` when given
    pub async fn generate_schema_hash(&self, source_id: &str, schema: Option<&str>) -> Result<String, AppError> {
        let tables = self.reader.introspect(source_id).await?;
        Ok(match schema {
            Some(schema) => hash_for_schema(&tables, schema),
            None => generate_hash_from_tables(&tables),
        })
    }

    pub async fn has_schema_changed(
        &self,
        source_id: &str,
        previous_hash: &str,
        schema: Option<&str>,
    ) -> Result<bool, AppError> {
        let current = self.generate_schema_hash(source_id, schema).await?;
        let changed = current != previous_hash;
        if changed {
            tracing::info!("Schema drift detected on source '{}' (schema {:?})", source_id, schema);
        }
        Ok(changed)
    }
}

/// Hash of the tables belonging to one schema
pub fn hash_for_schema(tables: &[TableMetadata], schema: &str) -> String {
    let scoped: Vec<TableMetadata> = tables.iter().filter(|t| t.schema_name == schema).cloned().collect();
    generate_hash_from_tables(&scoped)
}

/// Deterministic fingerprint of already materialized metadata.
///
/// The (schema, table, ordinal, column, type) tuples are sorted before
/// hashing, so the digest depends only on structure, never on input order.
pub fn generate_hash_from_tables(tables: &[TableMetadata]) -> String {
    let mut entries: Vec<(String, String, i32, String, String, String)> = tables
        .iter()
        .flat_map(|table| {
            table.columns.iter().map(move |column| {
                (
                    table.schema_name.clone(),
                    table.table_name.clone(),
                    column.ordinal_position,
                    column.name.clone(),
                    column.data_type.as_str().to_string(),
                    column.native_type.to_lowercase(),
                )
            })
        })
        .collect();

    // Tables without columns still count as structure
    entries.extend(
        tables
            .iter()
            .filter(|t| t.columns.is_empty())
            .map(|t| (t.schema_name.clone(), t.table_name.clone(), 0, String::new(), String::new(), String::new())),
    );

    entries.sort();

    let canonical: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|(schema, table, ordinal, column, data_type, native)| {
            serde_json::json!([schema, table, ordinal, column, data_type, native])
        })
        .collect();
    let json_str = serde_json::Value::Array(canonical).to_string();

    let mut hasher = Sha256::new();
    hasher.update(json_str.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataType, SourceType, TableType};
    use crate::services::database::{DocumentDriver, SourceRegistry};
    use serde_json::json;

    fn tables() -> Vec<TableMetadata> {
        vec![
            TableMetadata::new("a", SourceType::Postgres, "public", "customers", TableType::BaseTable)
                .with_column("id", DataType::Integer)
                .with_column("email", DataType::Text),
            TableMetadata::new("a", SourceType::Postgres, "public", "orders", TableType::BaseTable)
                .with_column("id", DataType::Integer)
                .with_column("customer_id", DataType::Integer),
            TableMetadata::new("a", SourceType::Postgres, "audit", "log", TableType::BaseTable)
                .with_column("id", DataType::Integer),
        ]
    }

    #[test]
    fn test_hash_is_invariant_under_reordering() {
        let original = tables();
        let mut reordered = original.clone();
        reordered.reverse();
        for table in reordered.iter_mut() {
            table.columns.reverse();
        }
        assert_eq!(generate_hash_from_tables(&original), generate_hash_from_tables(&reordered));
    }

    #[test]
    fn test_hash_changes_with_structure() {
        let original = tables();
        let mut dropped = original.clone();
        dropped[0].columns.pop();
        assert_ne!(generate_hash_from_tables(&original), generate_hash_from_tables(&dropped));

        let mut retyped = original.clone();
        retyped[1].columns[1].data_type = DataType::Text;
        assert_ne!(generate_hash_from_tables(&original), generate_hash_from_tables(&retyped));
    }

    #[test]
    fn test_schema_scoping() {
        let original = tables();
        let mut changed = original.clone();
        let first_column = changed[2].columns[0].clone();
        changed[2].columns.push(first_column);
        changed[2].columns[1].name = "actor".to_string();
        changed[2].columns[1].ordinal_position = 2;

        assert_eq!(hash_for_schema(&original, "public"), hash_for_schema(&changed, "public"));
        assert_ne!(hash_for_schema(&original, "audit"), hash_for_schema(&changed, "audit"));
    }

    #[tokio::test]
    async fn test_has_schema_changed_after_drop() {
        let driver = Arc::new(DocumentDriver::new());
        driver
            .insert_collection("customers", vec![json!({"id": 1, "email": "a@x"})])
            .await;
        let registry = Arc::new(SourceRegistry::new());
        registry.register("docs", None, driver.clone()).await;
        let tracker = SchemaHashTracker::new(Arc::new(SchemaCatalogReader::new(registry)));

        let before = tracker.generate_schema_hash("docs", Some("public")).await.unwrap();
        assert!(!tracker.has_schema_changed("docs", &before, Some("public")).await.unwrap());

        driver.insert_collection("customers", vec![json!({"id": 1})]).await;
        assert!(tracker.has_schema_changed("docs", &before, Some("public")).await.unwrap());
    }
}
