// Shared test fixtures: metadata, descriptor builders and stub drivers
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{
    ColumnMetadata, DataType, JoinCondition, JoinSide, JoinType, QueryDescriptor, QueryOptions, SourceType,
    TableAlias, TableMetadata, TableType,
};
use crate::services::database::{DocumentDriver, QueryResult, SourceDriver, SourceRegistry};

pub fn customers(source: &str, source_type: SourceType) -> TableMetadata {
    TableMetadata::new(source, source_type, "public", "customers", TableType::BaseTable)
        .with_column("id", DataType::Integer)
        .with_column("name", DataType::Text)
        .with_column("country", DataType::Text)
}

pub fn orders(source: &str, source_type: SourceType) -> TableMetadata {
    TableMetadata::new(source, source_type, "public", "orders", TableType::BaseTable)
        .with_column("id", DataType::Integer)
        .with_column("customer_id", DataType::Integer)
        .with_column("total", DataType::Decimal)
}

pub fn payments(source: &str, source_type: SourceType) -> TableMetadata {
    TableMetadata::new(source, source_type, "public", "payments", TableType::BaseTable)
        .with_column("id", DataType::Integer)
        .with_column("order_id", DataType::Integer)
        .with_column("amount", DataType::Decimal)
}

pub fn alias_of(table: &TableMetadata, alias: &str) -> TableAlias {
    TableAlias::new(alias, &table.data_source_id, &table.schema_name, &table.table_name)
}

/// A selected column of `table` under `alias`
pub fn select(table: &TableMetadata, alias: &str, column: &str) -> ColumnMetadata {
    let mut col = table
        .column(column)
        .cloned()
        .unwrap_or_else(|| panic!("fixture column {} missing", column));
    col.table_alias = Some(alias.to_string());
    col.is_selected = true;
    col
}

pub fn side(table: &TableMetadata, alias: &str, column: &str) -> JoinSide {
    JoinSide {
        schema: table.schema_name.clone(),
        table: table.table_name.clone(),
        alias: Some(alias.to_string()),
        column: column.to_string(),
    }
}

pub fn join(left: JoinSide, right: JoinSide, join_type: JoinType) -> JoinCondition {
    JoinCondition {
        id: format!("{}-{}", left.alias(), right.alias()),
        left,
        right,
        join_type,
        operator: Default::default(),
        join_logic: Default::default(),
        additional_conditions: Vec::new(),
        is_auto_detected: false,
    }
}

pub fn descriptor(
    root: &str,
    tables: Vec<TableAlias>,
    columns: Vec<ColumnMetadata>,
    joins: Vec<JoinCondition>,
) -> QueryDescriptor {
    QueryDescriptor {
        root_table: root.to_string(),
        tables,
        columns,
        options: QueryOptions::default(),
        calculated_columns: Vec::new(),
        joins,
    }
}

/// customers in source `a` (3 rows), orders in source `b` (2 rows, both
/// for customer 1)
pub async fn two_document_sources() -> Arc<SourceRegistry> {
    let a = DocumentDriver::new();
    a.insert_collection(
        "customers",
        vec![
            json!({"id": 1, "name": "Ada", "country": "UK"}),
            json!({"id": 2, "name": "Grace", "country": "US"}),
            json!({"id": 3, "name": "Linus", "country": "FI"}),
        ],
    )
    .await;

    let b = DocumentDriver::new();
    b.insert_collection(
        "orders",
        vec![
            json!({"id": 10, "customer_id": 1, "total": 12.5}),
            json!({"id": 11, "customer_id": 1, "total": 30.0}),
        ],
    )
    .await;

    let registry = Arc::new(SourceRegistry::new());
    registry.register("a", None, Arc::new(a)).await;
    registry.register("b", None, Arc::new(b)).await;
    registry
}

/// Driver returning fixed rows for any query, counting calls
pub struct StaticDriver {
    pub source_type: SourceType,
    pub tables: Vec<TableMetadata>,
    pub rows: Vec<Value>,
    pub calls: AtomicUsize,
}

impl StaticDriver {
    pub fn new(source_type: SourceType, tables: Vec<TableMetadata>, rows: Vec<Value>) -> Self {
        Self {
            source_type,
            tables,
            rows,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceDriver for StaticDriver {
    async fn introspect(&self, _source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        Ok(self.tables.clone())
    }

    async fn query(&self, _source_id: &str, _native_query: &str) -> Result<QueryResult, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(QueryResult::new(self.rows.clone(), 0))
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }
}

/// Driver whose every call fails as an unreachable source
pub struct FailingDriver;

#[async_trait]
impl SourceDriver for FailingDriver {
    async fn introspect(&self, _source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        Err(AppError::Connection("connection refused".to_string()))
    }

    async fn query(&self, _source_id: &str, _native_query: &str) -> Result<QueryResult, AppError> {
        Err(AppError::Connection("connection refused".to_string()))
    }

    fn source_type(&self) -> SourceType {
        SourceType::Postgres
    }
}

/// Driver that never answers
pub struct HangingDriver;

#[async_trait]
impl SourceDriver for HangingDriver {
    async fn introspect(&self, _source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        std::future::pending().await
    }

    async fn query(&self, _source_id: &str, _native_query: &str) -> Result<QueryResult, AppError> {
        std::future::pending().await
    }

    fn source_type(&self) -> SourceType {
        SourceType::Postgres
    }
}

/// Hanging driver that records when a query starts and when its in-flight
/// future is dropped
#[derive(Default)]
pub struct WatchedDriver {
    pub started: Arc<AtomicBool>,
    pub dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceDriver for WatchedDriver {
    async fn introspect(&self, _source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        std::future::pending().await
    }

    async fn query(&self, _source_id: &str, _native_query: &str) -> Result<QueryResult, AppError> {
        let _guard = SetOnDrop(self.dropped.clone());
        self.started.store(true, Ordering::SeqCst);
        std::future::pending().await
    }

    fn source_type(&self) -> SourceType {
        SourceType::Postgres
    }
}

/// Wait up to a second for `flag` to be set
pub async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..100 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    flag.load(Ordering::SeqCst)
}
