// PostgreSQL driver using connection pooling for optimal resource management
use crate::api::middleware::AppError;
use crate::models::{ColumnMetadata, ColumnReference, SourceType, TableMetadata, TableType};
use crate::services::database::adapter::{QueryResult, SourceDriver};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio_postgres::NoTls;
use url::Url;

const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema', 'pg_toast')";

pub struct PostgresDriver {
    pool: Pool,
}

impl PostgresDriver {
    /// Validate the URL and build a lazily connecting pool
    pub fn connect(connection_url: &str, max_pool_size: usize) -> Result<Self, AppError> {
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Validation(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(AppError::Validation("URL must use postgresql:// or postgres:// scheme".to_string()));
        }

        let mut cfg = PoolConfig::new();
        cfg.url = Some(connection_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Connection(format!("Failed to create connection pool: {}", e)))?;
        pool.resize(max_pool_size);

        tracing::info!("Created PostgreSQL pool for {} (max_size: {})", mask_credentials(connection_url), max_pool_size);
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }

    fn describe_error(e: tokio_postgres::Error) -> String {
        match e.as_db_error() {
            Some(db_error) => format!("Code: {}, Message: {}", db_error.code().code(), db_error.message()),
            None => e.to_string(),
        }
    }

    async fn load_references(
        client: &tokio_postgres::Client,
    ) -> Result<Vec<ColumnReference>, AppError> {
        let rows = client
            .query(
                r#"
                SELECT
                    kcu.table_schema::text,
                    kcu.table_name::text,
                    kcu.column_name::text,
                    ccu.table_schema::text,
                    ccu.table_name::text,
                    ccu.column_name::text
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                JOIN information_schema.constraint_column_usage ccu
                    ON ccu.constraint_name = tc.constraint_name
                    AND ccu.constraint_schema = tc.table_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                "#,
                &[],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to get foreign keys: {}", Self::describe_error(e))))?;

        Ok(rows
            .iter()
            .map(|row| ColumnReference {
                schema: row.get(0),
                table: row.get(1),
                column: row.get(2),
                foreign_schema: row.get(3),
                foreign_table: row.get(4),
                foreign_column: row.get(5),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceDriver for PostgresDriver {
    async fn introspect(&self, source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        let client = self.client().await?;

        let sql = format!(
            r#"
            SELECT
                c.table_schema::text,
                c.table_name::text,
                t.table_type::text,
                c.column_name::text,
                c.data_type::text,
                c.character_maximum_length::int8,
                c.ordinal_position::int4
            FROM information_schema.columns c
            JOIN information_schema.tables t
                ON t.table_schema = c.table_schema
                AND t.table_name = c.table_name
            WHERE c.table_schema NOT IN {}
            ORDER BY c.table_schema, c.table_name, c.ordinal_position
            "#,
            SYSTEM_SCHEMAS
        );
        let rows = client
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| AppError::Database(format!("Failed to get columns: {}", Self::describe_error(e))))?;

        let references = Self::load_references(&client).await?;

        let mut tables: BTreeMap<(String, String), TableMetadata> = BTreeMap::new();
        for row in rows {
            let schema: String = row.get(0);
            let name: String = row.get(1);
            let table_type: String = row.get(2);

            let table = tables.entry((schema.clone(), name.clone())).or_insert_with(|| {
                TableMetadata::new(source_id, SourceType::Postgres, schema, name, TableType::from_native(&table_type))
            });

            let mut column = ColumnMetadata::new(
                table,
                row.get::<_, String>(3),
                Default::default(),
                row.get::<_, String>(4),
                row.get::<_, i32>(6),
            );
            column.max_length = row.get::<_, Option<i64>>(5);
            column.reference = references
                .iter()
                .find(|r| r.schema == column.schema_name && r.table == column.table_name && r.column == column.name)
                .cloned();
            table.columns.push(column);
        }

        Ok(tables.into_values().collect())
    }

    async fn query(&self, source_id: &str, native_query: &str) -> Result<QueryResult, AppError> {
        let client = self.client().await?;
        let start_time = Instant::now();

        // Every row comes back as one jsonb object, so NUMERIC, temporal and
        // uuid columns need no per-type decoding
        let wrapped = format!("SELECT to_jsonb(\"q\") FROM ({}) AS \"q\"", native_query);
        tracing::debug!("PostgreSQL query on '{}': {}", source_id, native_query);

        let rows = client
            .query(wrapped.as_str(), &[])
            .await
            .map_err(|e| AppError::Database(format!("Query execution failed: {}", Self::describe_error(e))))?;

        let json_rows = rows
            .iter()
            .map(|row| row.try_get::<_, Value>(0))
            .collect::<Result<Vec<Value>, _>>()
            .map_err(|e| AppError::Database(format!("Failed to decode row: {}", e)))?;

        Ok(QueryResult::new(json_rows, start_time.elapsed().as_millis() as u64))
    }

    fn source_type(&self) -> SourceType {
        SourceType::Postgres
    }
}

/// Replace the password in a connection URL for logging
pub fn mask_credentials(connection_url: &str) -> String {
    match Url::parse(connection_url) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<invalid url>".to_string(),
    }
}
