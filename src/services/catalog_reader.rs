// Schema Catalog Reader
//
// Introspects one data source through its driver and normalizes relational,
// document and flat-file shapes into TableMetadata / ColumnMetadata.

use std::collections::HashSet;
use std::sync::Arc;

use datafusion::arrow::datatypes::DataType as ArrowType;
use serde_json::Value;

use crate::api::middleware::AppError;
use crate::models::{ColumnMetadata, DataType, SourceType, TableMetadata};
use crate::services::database::SourceRegistry;

pub struct SchemaCatalogReader {
    registry: Arc<SourceRegistry>,
}

impl SchemaCatalogReader {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry }
    }

    /// Introspect a source and return its normalized tables.
    ///
    /// An unreachable source yields `AppError::Connection` naming the source;
    /// callers decide whether to fall back to metadata they already hold.
    pub async fn introspect(&self, source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        let source = self.registry.get(source_id).await?;

        let raw = source.driver.introspect(source_id).await.map_err(|e| match e {
            AppError::Connection(msg) | AppError::Database(msg) => {
                AppError::Connection(format!("Cannot introspect source '{}': {}", source_id, msg))
            }
            other => other,
        })?;

        let tables = normalize_tables(source_id, source.source_type, raw);
        tracing::debug!("Introspected {} tables from source '{}'", tables.len(), source_id);
        Ok(tables)
    }
}

/// Bring driver output into the common shape: ownership fields filled in,
/// duplicate tables collapsed, columns ordered by ordinal position and every
/// type tag resolved from its native name.
pub fn normalize_tables(source_id: &str, source_type: SourceType, tables: Vec<TableMetadata>) -> Vec<TableMetadata> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tables.len());

    for mut table in tables {
        if !seen.insert((table.schema_name.clone(), table.table_name.clone())) {
            tracing::warn!(
                "Duplicate table {} in snapshot of source '{}', keeping the first",
                table.qualified_name(),
                source_id
            );
            continue;
        }

        table.data_source_id = source_id.to_string();
        table.data_source_type = source_type;

        for (idx, column) in table.columns.iter_mut().enumerate() {
            column.data_source_id = source_id.to_string();
            column.data_source_type = Some(source_type);
            column.table_name = table.table_name.clone();
            column.schema_name = table.schema_name.clone();
            if column.ordinal_position <= 0 {
                column.ordinal_position = idx as i32 + 1;
            }
            if column.data_type == DataType::Unknown && !column.native_type.is_empty() {
                column.data_type = map_native_type(source_type, &column.native_type);
            }
        }
        table.columns.sort_by_key(|c| c.ordinal_position);

        out.push(table);
    }

    out
}

/// Map a native type name onto the closed tag set. Unrecognized names map to
/// `Unknown` rather than failing.
pub fn map_native_type(source_type: SourceType, native: &str) -> DataType {
    let lowered = native.trim().to_lowercase();

    // tinyint(1) is MySQL's boolean
    if source_type == SourceType::MySql && lowered == "tinyint(1)" {
        return DataType::Boolean;
    }

    let base = lowered.split('(').next().unwrap_or("").trim();
    let base = base.trim_end_matches(" unsigned");

    match base {
        "smallint" | "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "tinyint" | "mediumint"
        | "serial" | "bigserial" | "smallserial" | "long" | "int32" | "int64" => DataType::Integer,
        "numeric" | "decimal" | "real" | "double precision" | "double" | "float" | "float4" | "float8"
        | "money" | "decimal128" | "number" => DataType::Decimal,
        "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "citext" | "name"
        | "tinytext" | "mediumtext" | "longtext" | "enum" | "set" | "string" | "objectid" | "utf8"
        | "largeutf8" => DataType::Text,
        "boolean" | "bool" | "bit" => DataType::Boolean,
        "date" | "date32" | "date64" => DataType::Date,
        "timestamp" | "timestamp without time zone" | "timestamp with time zone" | "timestamptz"
        | "datetime" => DataType::Timestamp,
        "uuid" | "uniqueidentifier" => DataType::Uuid,
        "json" | "jsonb" | "object" | "array" => DataType::Json,
        _ => DataType::Unknown,
    }
}

/// Map an Arrow type (flat files, document batches) onto the tag set
pub fn map_arrow_type(arrow: &ArrowType) -> DataType {
    match arrow {
        ArrowType::Int8
        | ArrowType::Int16
        | ArrowType::Int32
        | ArrowType::Int64
        | ArrowType::UInt8
        | ArrowType::UInt16
        | ArrowType::UInt32
        | ArrowType::UInt64 => DataType::Integer,
        ArrowType::Float16
        | ArrowType::Float32
        | ArrowType::Float64
        | ArrowType::Decimal128(_, _)
        | ArrowType::Decimal256(_, _) => DataType::Decimal,
        ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Utf8View => DataType::Text,
        ArrowType::Boolean => DataType::Boolean,
        ArrowType::Date32 | ArrowType::Date64 => DataType::Date,
        ArrowType::Timestamp(_, _) => DataType::Timestamp,
        ArrowType::Struct(_) | ArrowType::List(_) | ArrowType::LargeList(_) => DataType::Json,
        _ => DataType::Unknown,
    }
}

fn json_kind(value: &Value) -> Option<(DataType, &'static str)> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some((DataType::Boolean, "bool")),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some((DataType::Integer, "long")),
        Value::Number(_) => Some((DataType::Decimal, "double")),
        Value::String(_) => Some((DataType::Text, "string")),
        Value::Array(_) => Some((DataType::Json, "array")),
        Value::Object(_) => Some((DataType::Json, "object")),
    }
}

/// Derive columns for a document collection from sampled documents.
///
/// Top-level keys become columns in first-seen order. Integer and decimal
/// samples widen to decimal; any other disagreement yields `Unknown`.
pub fn columns_from_documents(table: &TableMetadata, documents: &[Value]) -> Vec<ColumnMetadata> {
    let mut order: Vec<String> = Vec::new();
    let mut types: Vec<Option<(DataType, &'static str)>> = Vec::new();

    for doc in documents {
        let Some(obj) = doc.as_object() else {
            continue;
        };
        for (key, value) in obj {
            let idx = match order.iter().position(|k| k == key) {
                Some(idx) => idx,
                None => {
                    order.push(key.clone());
                    types.push(None);
                    order.len() - 1
                }
            };

            let Some(kind) = json_kind(value) else {
                continue;
            };
            types[idx] = Some(match types[idx] {
                None => kind,
                Some(existing) if existing.0 == kind.0 => existing,
                Some((DataType::Integer, _)) if kind.0 == DataType::Decimal => kind,
                Some((DataType::Decimal, n)) if kind.0 == DataType::Integer => (DataType::Decimal, n),
                Some(_) => (DataType::Unknown, "mixed"),
            });
        }
    }

    order
        .into_iter()
        .zip(types)
        .enumerate()
        .map(|(idx, (name, kind))| {
            let (data_type, native) = kind.unwrap_or((DataType::Unknown, "null"));
            ColumnMetadata::new(table, name, data_type, native, idx as i32 + 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableType;
    use serde_json::json;

    #[test]
    fn test_map_native_types() {
        assert_eq!(map_native_type(SourceType::Postgres, "integer"), DataType::Integer);
        assert_eq!(map_native_type(SourceType::Postgres, "character varying(255)"), DataType::Text);
        assert_eq!(map_native_type(SourceType::Postgres, "timestamp with time zone"), DataType::Timestamp);
        assert_eq!(map_native_type(SourceType::MySql, "tinyint(1)"), DataType::Boolean);
        assert_eq!(map_native_type(SourceType::MySql, "int unsigned"), DataType::Integer);
        assert_eq!(map_native_type(SourceType::Document, "objectId"), DataType::Text);
        assert_eq!(map_native_type(SourceType::Postgres, "tsvector"), DataType::Unknown);
    }

    #[test]
    fn test_map_arrow_types() {
        assert_eq!(map_arrow_type(&ArrowType::Int64), DataType::Integer);
        assert_eq!(map_arrow_type(&ArrowType::Utf8), DataType::Text);
        assert_eq!(map_arrow_type(&ArrowType::Binary), DataType::Unknown);
    }

    #[test]
    fn test_columns_from_documents() {
        let table = TableMetadata::new("docs", SourceType::Document, "public", "events", TableType::Collection);
        let docs = vec![
            json!({"id": 1, "amount": 3, "tag": "a", "meta": {"k": 1}}),
            json!({"id": 2, "amount": 4.5, "tag": 7, "extra": null}),
        ];

        let columns = columns_from_documents(&table, &docs);
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "amount", "tag", "meta", "extra"]);
        assert_eq!(columns[0].data_type, DataType::Integer);
        assert_eq!(columns[1].data_type, DataType::Decimal);
        assert_eq!(columns[2].data_type, DataType::Unknown);
        assert_eq!(columns[3].data_type, DataType::Json);
        assert_eq!(columns[4].data_type, DataType::Unknown);
        assert_eq!(columns[4].ordinal_position, 5);
    }

    #[test]
    fn test_normalize_collapses_duplicates_and_fills_ownership() {
        let mut table = TableMetadata::new("", SourceType::Postgres, "public", "customers", TableType::BaseTable);
        let mut email = ColumnMetadata::new(&table, "email", DataType::Unknown, "varchar(120)", 2);
        email.data_source_id = String::new();
        let id = ColumnMetadata::new(&table, "id", DataType::Unknown, "bigint", 1);
        table.columns = vec![email, id];

        let tables = normalize_tables("crm", SourceType::Postgres, vec![table.clone(), table]);
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.data_source_id, "crm");
        assert_eq!(t.columns[0].name, "id");
        assert_eq!(t.columns[0].data_type, DataType::Integer);
        assert_eq!(t.columns[1].data_type, DataType::Text);
        assert_eq!(t.columns[1].data_source_id, "crm");
    }
}
