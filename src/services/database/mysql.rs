// MySQL driver using connection pooling for optimal resource management
use crate::api::middleware::AppError;
use crate::models::{ColumnMetadata, ColumnReference, SourceType, TableMetadata, TableType};
use crate::services::database::adapter::{QueryResult, SourceDriver};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, Value as MySqlValue};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use url::Url;

/// Collation id MySQL reports for binary strings and blobs
const BINARY_COLLATION: u16 = 63;

pub struct MySqlDriver {
    pool: Pool,
}

impl MySqlDriver {
    pub fn connect(connection_url: &str, max_pool_size: usize) -> Result<Self, AppError> {
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(AppError::Validation("URL must use mysql:// or mariadb:// scheme".to_string()));
        }

        // mysql_async only understands the mysql:// scheme
        let normalized = connection_url.replacen("mariadb://", "mysql://", 1);
        let opts = mysql_async::Opts::from_url(&normalized)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;
        let constraints = PoolConstraints::new(1, max_pool_size.max(1))
            .ok_or_else(|| AppError::Validation(format!("Invalid MySQL pool size: {}", max_pool_size)))?;
        let pool = Pool::new(
            OptsBuilder::from_opts(opts).pool_opts(PoolOpts::default().with_constraints(constraints)),
        );

        tracing::info!("Created MySQL pool (max_size: {})", max_pool_size.max(1));
        Ok(Self { pool })
    }

    async fn get_conn(&self) -> Result<Conn, AppError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get MySQL connection from pool: {}", e)))
    }

    /// Text protocol rows carry every value as bytes; the column type decides
    /// how they are decoded. Binary columns, and any bytes that are not UTF-8,
    /// come back as base64 strings.
    fn mysql_value_to_json(column_type: ColumnType, binary: bool, mysql_val: MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) if binary => json!(BASE64.encode(bytes)),
            MySqlValue::Bytes(bytes) => {
                let text = match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => return json!(BASE64.encode(e.into_bytes())),
                };
                match column_type {
                    ColumnType::MYSQL_TYPE_TINY
                    | ColumnType::MYSQL_TYPE_SHORT
                    | ColumnType::MYSQL_TYPE_LONG
                    | ColumnType::MYSQL_TYPE_INT24
                    | ColumnType::MYSQL_TYPE_LONGLONG
                    | ColumnType::MYSQL_TYPE_YEAR => text
                        .parse::<i64>()
                        .map(|v| json!(v))
                        .or_else(|_| text.parse::<u64>().map(|v| json!(v)))
                        .unwrap_or_else(|_| json!(text)),
                    ColumnType::MYSQL_TYPE_FLOAT
                    | ColumnType::MYSQL_TYPE_DOUBLE
                    | ColumnType::MYSQL_TYPE_DECIMAL
                    | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                        text.parse::<f64>().map(|v| json!(v)).unwrap_or_else(|_| json!(text))
                    }
                    ColumnType::MYSQL_TYPE_JSON => serde_json::from_str(&text).unwrap_or_else(|_| json!(text)),
                    _ => json!(text),
                }
            }
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }

    fn row_to_json(row: Row) -> Value {
        let columns = row.columns();
        let mut row_obj = serde_json::Map::new();
        for (idx, column) in columns.iter().enumerate() {
            let value = match row.as_ref(idx) {
                Some(v) => Self::mysql_value_to_json(column.column_type(), is_binary(column), v.clone()),
                None => Value::Null,
            };
            row_obj.insert(column.name_str().to_string(), value);
        }
        Value::Object(row_obj)
    }

    async fn load_references(conn: &mut Conn) -> Result<Vec<ColumnReference>, AppError> {
        let rows: Vec<(String, String, String, String, String, String)> = conn
            .query(
                r#"
                SELECT
                    TABLE_SCHEMA,
                    TABLE_NAME,
                    COLUMN_NAME,
                    REFERENCED_TABLE_SCHEMA,
                    REFERENCED_TABLE_NAME,
                    REFERENCED_COLUMN_NAME
                FROM information_schema.KEY_COLUMN_USAGE
                WHERE REFERENCED_TABLE_NAME IS NOT NULL
                  AND TABLE_SCHEMA NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
                "#,
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to get foreign keys: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(schema, table, column, foreign_schema, foreign_table, foreign_column)| ColumnReference {
                schema,
                table,
                column,
                foreign_schema,
                foreign_table,
                foreign_column,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SourceDriver for MySqlDriver {
    async fn introspect(&self, source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        let mut conn = self.get_conn().await?;

        let rows: Vec<(String, String, String, String, String, Option<u64>, u32)> = conn
            .query(
                r#"
                SELECT
                    c.TABLE_SCHEMA,
                    c.TABLE_NAME,
                    t.TABLE_TYPE,
                    c.COLUMN_NAME,
                    c.COLUMN_TYPE,
                    c.CHARACTER_MAXIMUM_LENGTH,
                    c.ORDINAL_POSITION
                FROM information_schema.COLUMNS c
                JOIN information_schema.TABLES t
                    ON t.TABLE_SCHEMA = c.TABLE_SCHEMA
                    AND t.TABLE_NAME = c.TABLE_NAME
                WHERE c.TABLE_SCHEMA NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
                ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
                "#,
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to get columns: {}", e)))?;

        let references = Self::load_references(&mut conn).await?;

        let mut tables: BTreeMap<(String, String), TableMetadata> = BTreeMap::new();
        for (schema, name, table_type, column_name, column_type, max_length, ordinal) in rows {
            let table = tables.entry((schema.clone(), name.clone())).or_insert_with(|| {
                TableMetadata::new(source_id, SourceType::MySql, schema, name, TableType::from_native(&table_type))
            });

            let mut column = ColumnMetadata::new(table, column_name, Default::default(), column_type, ordinal as i32);
            column.max_length = max_length.map(|v| v as i64);
            column.reference = references
                .iter()
                .find(|r| r.schema == column.schema_name && r.table == column.table_name && r.column == column.name)
                .cloned();
            table.columns.push(column);
        }

        Ok(tables.into_values().collect())
    }

    async fn query(&self, source_id: &str, native_query: &str) -> Result<QueryResult, AppError> {
        let mut conn = self.get_conn().await?;
        let start_time = Instant::now();
        tracing::debug!("MySQL query on '{}': {}", source_id, native_query);

        let rows: Vec<Row> = conn
            .query(native_query)
            .await
            .map_err(|e| AppError::Database(format!("Query execution failed: {}", e)))?;

        let json_rows = rows.into_iter().map(Self::row_to_json).collect();
        Ok(QueryResult::new(json_rows, start_time.elapsed().as_millis() as u64))
    }

    fn source_type(&self) -> SourceType {
        SourceType::MySql
    }
}

/// BINARY, VARBINARY and BLOB columns. Numeric columns report the binary
/// collation too, so the type is checked as well.
fn is_binary(column: &mysql_async::Column) -> bool {
    column.character_set() == BINARY_COLLATION
        && matches!(
            column.column_type(),
            ColumnType::MYSQL_TYPE_STRING
                | ColumnType::MYSQL_TYPE_VAR_STRING
                | ColumnType::MYSQL_TYPE_VARCHAR
                | ColumnType::MYSQL_TYPE_BLOB
                | ColumnType::MYSQL_TYPE_TINY_BLOB
                | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
                | ColumnType::MYSQL_TYPE_LONG_BLOB
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(column_type: ColumnType, bytes: &[u8]) -> Value {
        MySqlDriver::mysql_value_to_json(column_type, false, MySqlValue::Bytes(bytes.to_vec()))
    }

    #[test]
    fn test_text_protocol_values_follow_column_type() {
        assert_eq!(decode(ColumnType::MYSQL_TYPE_LONG, b"42"), json!(42));
        assert_eq!(decode(ColumnType::MYSQL_TYPE_NEWDECIMAL, b"9.50"), json!(9.5));
        assert_eq!(decode(ColumnType::MYSQL_TYPE_VAR_STRING, b"007"), json!("007"));
        assert_eq!(
            MySqlDriver::mysql_value_to_json(ColumnType::MYSQL_TYPE_LONG, false, MySqlValue::NULL),
            Value::Null
        );
    }

    #[test]
    fn test_binary_values_are_base64() {
        // Not valid UTF-8, so it must not collapse to null
        assert_eq!(decode(ColumnType::MYSQL_TYPE_BLOB, &[0xde, 0xad, 0xbe, 0xef]), json!("3q2+7w=="));

        // Binary columns encode even when the bytes happen to be UTF-8
        let blob = MySqlDriver::mysql_value_to_json(ColumnType::MYSQL_TYPE_BLOB, true, MySqlValue::Bytes(b"hi".to_vec()));
        assert_eq!(blob, json!("aGk="));
    }

    #[tokio::test]
    async fn test_rejects_wrong_scheme() {
        assert!(matches!(
            MySqlDriver::connect("postgres://localhost/db", 4),
            Err(AppError::Validation(_))
        ));
    }
}
