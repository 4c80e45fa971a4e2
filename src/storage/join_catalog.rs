use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{CatalogSide, JoinCatalogEntry, JoinDefinition, JoinType, TableRef};

const ENTRY_COLUMNS: &str = "id, left_source_id, left_schema, left_table, left_column, \
     right_source_id, right_schema, right_table, right_column, join_type, usage_count, \
     created_by, created_at, left_schema_hash, right_schema_hash";

/// SQLite store for confirmed joins.
/// Uses tokio::Mutex so every write is serialized on one connection.
#[derive(Clone)]
pub struct JoinCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(column: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, err.into())
}

fn entry_from_row(row: &rusqlite::Row) -> SqliteResult<JoinCatalogEntry> {
    let join_type: String = row.get(9)?;
    let created_at: String = row.get(12)?;

    Ok(JoinCatalogEntry {
        id: row.get(0)?,
        left: CatalogSide::new(
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ),
        right: CatalogSide::new(
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
        ),
        join_type: JoinType::from_str(&join_type).map_err(|e| conversion_error(9, e))?,
        usage_count: row.get(10)?,
        created_by: row.get(11)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| conversion_error(12, e))?
            .with_timezone(&Utc),
        left_schema_hash: row.get(13)?,
        right_schema_hash: row.get(14)?,
    })
}

impl JoinCatalogStore {
    /// Open (or create) the catalog database
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        // Accept SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path = path_str.trim_start_matches("sqlite:").trim_start_matches("//");

        let conn = Connection::open(clean_path)?;
        Self::with_connection(conn).await
    }

    /// Private in-memory catalog, used by tests and ephemeral deployments
    pub async fn in_memory() -> SqliteResult<Self> {
        Self::with_connection(Connection::open_in_memory()?).await
    }

    async fn with_connection(conn: Connection) -> SqliteResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        // Cascading deletes depend on this; it is per connection
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS data_sources (
                id TEXT PRIMARY KEY,
                name TEXT,
                source_type TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS join_catalog (
                id TEXT PRIMARY KEY,
                left_source_id TEXT NOT NULL,
                left_schema TEXT NOT NULL,
                left_table TEXT NOT NULL,
                left_column TEXT NOT NULL,
                right_source_id TEXT NOT NULL,
                right_schema TEXT NOT NULL,
                right_table TEXT NOT NULL,
                right_column TEXT NOT NULL,
                join_type TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 1,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                left_schema_hash TEXT NOT NULL,
                right_schema_hash TEXT NOT NULL,
                FOREIGN KEY (left_source_id) REFERENCES data_sources(id) ON DELETE CASCADE,
                FOREIGN KEY (right_source_id) REFERENCES data_sources(id) ON DELETE CASCADE,
                UNIQUE(left_source_id, left_schema, left_table, left_column,
                       right_source_id, right_schema, right_table, right_column)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_join_catalog_left ON join_catalog(left_source_id, left_schema, left_table)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_join_catalog_right ON join_catalog(right_source_id, right_schema, right_table)",
            [],
        )?;

        Ok(())
    }

    /// Register (or rename) a data source
    pub async fn register_source(&self, id: &str, name: Option<&str>, source_type: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO data_sources (id, name, source_type, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, source_type = excluded.source_type
            "#,
            params![id, name, source_type, now()],
        )?;
        Ok(())
    }

    /// Save a confirmed join. Saving the same column pair again, in either
    /// orientation, increments its usage count and refreshes the stored
    /// schema hashes.
    pub async fn save_join(
        &self,
        definition: &JoinDefinition,
        left_schema_hash: &str,
        right_schema_hash: &str,
    ) -> SqliteResult<JoinCatalogEntry> {
        let (canonical, swapped) = definition.canonical();
        let (left_hash, right_hash) = if swapped {
            (right_schema_hash, left_schema_hash)
        } else {
            (left_schema_hash, right_schema_hash)
        };
        let (l, r) = (&canonical.left, &canonical.right);
        let timestamp = now();

        let conn = self.conn.lock().await;
        for source_id in [&l.data_source_id, &r.data_source_id] {
            conn.execute(
                "INSERT OR IGNORE INTO data_sources (id, created_at) VALUES (?1, ?2)",
                params![source_id, timestamp],
            )?;
        }

        conn.execute(
            r#"
            INSERT INTO join_catalog (
                id, left_source_id, left_schema, left_table, left_column,
                right_source_id, right_schema, right_table, right_column,
                join_type, usage_count, created_by, created_at, updated_at,
                left_schema_hash, right_schema_hash
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?12, ?12, ?13, ?14)
            ON CONFLICT(left_source_id, left_schema, left_table, left_column,
                        right_source_id, right_schema, right_table, right_column)
            DO UPDATE SET
                usage_count = usage_count + 1,
                join_type = excluded.join_type,
                updated_at = excluded.updated_at,
                left_schema_hash = excluded.left_schema_hash,
                right_schema_hash = excluded.right_schema_hash
            "#,
            params![
                Uuid::new_v4().to_string(),
                l.data_source_id,
                l.schema,
                l.table,
                l.column,
                r.data_source_id,
                r.schema,
                r.table,
                r.column,
                canonical.join_type.as_str(),
                canonical.created_by,
                timestamp,
                left_hash,
                right_hash,
            ],
        )?;

        let entry = conn.query_row(
            &format!(
                "SELECT {} FROM join_catalog WHERE left_source_id = ?1 AND left_schema = ?2 AND left_table = ?3 \
                 AND left_column = ?4 AND right_source_id = ?5 AND right_schema = ?6 AND right_table = ?7 \
                 AND right_column = ?8",
                ENTRY_COLUMNS
            ),
            params![l.data_source_id, l.schema, l.table, l.column, r.data_source_id, r.schema, r.table, r.column],
            entry_from_row,
        )?;

        tracing::info!(
            "Saved join {}.{}.{} = {}.{}.{} (usage {})",
            l.data_source_id,
            l.table,
            l.column,
            r.data_source_id,
            r.table,
            r.column,
            entry.usage_count
        );
        Ok(entry)
    }

    /// Entries between two tables in either orientation, oriented with
    /// `left` on the left, most used first then newest first
    pub async fn entries_for_pair(&self, left: &TableRef, right: &TableRef) -> SqliteResult<Vec<JoinCatalogEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM join_catalog
            WHERE (left_source_id = ?1 AND left_schema = ?2 AND left_table = ?3
                   AND right_source_id = ?4 AND right_schema = ?5 AND right_table = ?6)
               OR (left_source_id = ?4 AND left_schema = ?5 AND left_table = ?6
                   AND right_source_id = ?1 AND right_schema = ?2 AND right_table = ?3)
            ORDER BY usage_count DESC, created_at DESC
            "#,
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map(
                params![
                    left.data_source_id,
                    left.schema,
                    left.table,
                    right.data_source_id,
                    right.schema,
                    right.table
                ],
                entry_from_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(entries.iter().map(|e| e.oriented_to(left)).collect())
    }

    pub async fn get(&self, id: &str) -> SqliteResult<Option<JoinCatalogEntry>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {} FROM join_catalog WHERE id = ?1", ENTRY_COLUMNS),
            params![id],
            entry_from_row,
        )
        .optional()
    }

    /// Remove a data source and, through the foreign keys, every catalog
    /// entry referencing it. Returns the number of entries removed.
    pub async fn delete_source(&self, id: &str) -> SqliteResult<usize> {
        let conn = self.conn.lock().await;
        let entries: i64 = conn.query_row(
            "SELECT COUNT(*) FROM join_catalog WHERE left_source_id = ?1 OR right_source_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        conn.execute("DELETE FROM data_sources WHERE id = ?1", params![id])?;

        tracing::info!("Deleted data source '{}' and {} catalog entries", id, entries);
        Ok(entries as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn definition() -> JoinDefinition {
        JoinDefinition {
            left: CatalogSide::new("a", "public", "customers", "id"),
            right: CatalogSide::new("b", "public", "orders", "customer_id"),
            join_type: JoinType::Left,
            created_by: Some("analyst".to_string()),
        }
    }

    fn reversed(def: &JoinDefinition) -> JoinDefinition {
        JoinDefinition {
            left: def.right.clone(),
            right: def.left.clone(),
            join_type: def.join_type.flipped(),
            created_by: def.created_by.clone(),
        }
    }

    fn customers() -> TableRef {
        TableRef::new("a", "public", "customers")
    }

    fn orders() -> TableRef {
        TableRef::new("b", "public", "orders")
    }

    #[tokio::test]
    async fn test_either_orientation_shares_usage_count() {
        let store = JoinCatalogStore::in_memory().await.unwrap();

        let first = store.save_join(&definition(), "h-a1", "h-b1").await.unwrap();
        assert_eq!(first.usage_count, 1);

        let second = store.save_join(&reversed(&definition()), "h-b2", "h-a2").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.usage_count, 2);

        let entries = store.entries_for_pair(&customers(), &orders()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].left.table, "customers");
        assert_eq!(entries[0].join_type, JoinType::Left);
        // Reconfirmation refreshes both hashes
        assert_eq!(entries[0].left_schema_hash, "h-a2");
        assert_eq!(entries[0].right_schema_hash, "h-b2");

        let from_orders = store.entries_for_pair(&orders(), &customers()).await.unwrap();
        assert_eq!(from_orders[0].left.table, "orders");
        assert_eq!(from_orders[0].join_type, JoinType::Right);
        assert_eq!(from_orders[0].left_schema_hash, "h-b2");
    }

    #[tokio::test]
    async fn test_entries_ranked_by_usage() {
        let store = JoinCatalogStore::in_memory().await.unwrap();
        let mut by_name = definition();
        by_name.left.column = "name".to_string();
        by_name.right.column = "customer_name".to_string();

        store.save_join(&by_name, "x", "y").await.unwrap();
        store.save_join(&definition(), "x", "y").await.unwrap();
        store.save_join(&definition(), "x", "y").await.unwrap();

        let entries = store.entries_for_pair(&customers(), &orders()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].left.column, "id");
        assert_eq!(entries[0].usage_count, 2);
        assert_eq!(entries[1].left.column, "name");
    }

    #[tokio::test]
    async fn test_delete_source_cascades() {
        let store = JoinCatalogStore::in_memory().await.unwrap();
        store.register_source("a", Some("CRM"), "postgres").await.unwrap();
        let entry = store.save_join(&definition(), "x", "y").await.unwrap();

        assert!(store.get(&entry.id).await.unwrap().is_some());
        assert_eq!(store.delete_source("b").await.unwrap(), 1);
        assert!(store.get(&entry.id).await.unwrap().is_none());
        assert!(store.entries_for_pair(&customers(), &orders()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_saves_are_atomic() {
        let store = JoinCatalogStore::in_memory().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let def = if i % 2 == 0 { definition() } else { reversed(&definition()) };
                store.save_join(&def, "x", "y").await.map(|e| e.usage_count)
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let entries = store.entries_for_pair(&customers(), &orders()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].usage_count, 20);
    }

    #[tokio::test]
    async fn test_catalog_persists_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");

        {
            let store = JoinCatalogStore::new(&path).await.unwrap();
            store.save_join(&definition(), "x", "y").await.unwrap();
        }

        let reopened = JoinCatalogStore::new(format!("sqlite:{}", path.display())).await.unwrap();
        let entries = reopened.entries_for_pair(&customers(), &orders()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].created_by.as_deref(), Some("analyst"));
    }
}
