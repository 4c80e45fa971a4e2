// Flat file driver
//
// Every CSV or NDJSON file in a directory is one table in the `public`
// schema, named after the file stem. Files are registered with DataFusion per
// call, so edits on disk show up in the next introspection.

use async_trait::async_trait;
use datafusion::prelude::{CsvReadOptions, NdJsonReadOptions, SessionContext};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::models::{ColumnMetadata, SourceType, TableMetadata, TableType};
use crate::services::catalog_reader::map_arrow_type;
use crate::services::database::adapter::{QueryResult, SourceDriver};
use crate::services::datafusion::{DataFusionQueryExecutor, DataFusionSessionManager};

pub const FILE_SCHEMA: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Csv,
    NdJson,
}

#[derive(Debug, Clone)]
struct DataFile {
    table: String,
    path: PathBuf,
    format: FileFormat,
    extension: String,
}

pub struct FlatFileDriver {
    directory: PathBuf,
    sessions: DataFusionSessionManager,
    timeout: Duration,
}

impl FlatFileDriver {
    pub fn from_directory(directory: impl Into<PathBuf>) -> Result<Self, AppError> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(AppError::Validation(format!(
                "Flat file source path {} is not a directory",
                directory.display()
            )));
        }
        Ok(Self {
            directory,
            sessions: DataFusionSessionManager::default_config(),
            timeout: Duration::from_secs(60),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn list_files(&self) -> Result<Vec<DataFile>, AppError> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            AppError::Connection(format!("Cannot read directory {}: {}", self.directory.display(), e))
        })?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(file) = Self::classify(&path) {
                files.push(file);
            }
        }
        files.sort_by(|a, b| a.table.cmp(&b.table));
        Ok(files)
    }

    fn classify(path: &Path) -> Option<DataFile> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        let format = match extension.as_str() {
            "csv" => FileFormat::Csv,
            "ndjson" | "jsonl" | "json" => FileFormat::NdJson,
            _ => return None,
        };
        let table = path.file_stem()?.to_str()?.to_string();
        Some(DataFile {
            table,
            path: path.to_path_buf(),
            format,
            extension: format!(".{}", extension),
        })
    }

    async fn register_all(&self, files: &[DataFile]) -> Result<SessionContext, AppError> {
        let ctx = self.sessions.create_session()?;

        for file in files {
            let path = file
                .path
                .to_str()
                .ok_or_else(|| AppError::Validation(format!("Non UTF-8 path {}", file.path.display())))?;

            let registered = match file.format {
                FileFormat::Csv => {
                    ctx.register_csv(
                        file.table.as_str(),
                        path,
                        CsvReadOptions::new().file_extension(&file.extension),
                    )
                    .await
                }
                FileFormat::NdJson => {
                    ctx.register_json(
                        file.table.as_str(),
                        path,
                        NdJsonReadOptions::default().file_extension(&file.extension),
                    )
                    .await
                }
            };
            registered.map_err(|e| {
                AppError::Database(format!("Failed to register {}: {}", file.path.display(), e))
            })?;
        }

        Ok(ctx)
    }
}

#[async_trait]
impl SourceDriver for FlatFileDriver {
    async fn introspect(&self, source_id: &str) -> Result<Vec<TableMetadata>, AppError> {
        let files = self.list_files()?;
        let ctx = self.register_all(&files).await?;

        let mut tables = Vec::with_capacity(files.len());
        for file in &files {
            let df = ctx
                .table(file.table.as_str())
                .await
                .map_err(|e| AppError::Database(format!("Failed to read {}: {}", file.path.display(), e)))?;

            let mut table = TableMetadata::new(source_id, SourceType::FlatFile, FILE_SCHEMA, &file.table, TableType::File);
            table.original_name = file.path.file_name().and_then(|n| n.to_str()).map(str::to_string);
            table.columns = df
                .schema()
                .fields()
                .iter()
                .enumerate()
                .map(|(idx, field)| {
                    ColumnMetadata::new(
                        &table,
                        field.name().clone(),
                        map_arrow_type(field.data_type()),
                        field.data_type().to_string(),
                        idx as i32 + 1,
                    )
                })
                .collect();
            tables.push(table);
        }

        Ok(tables)
    }

    async fn query(&self, source_id: &str, native_query: &str) -> Result<QueryResult, AppError> {
        let files = self.list_files()?;
        let ctx = self.register_all(&files).await?;

        tracing::debug!("Flat file query on '{}': {}", source_id, native_query);
        DataFusionQueryExecutor::new(ctx, self.timeout)
            .execute_query(native_query)
            .await
            .map_err(|e| AppError::Database(format!("{:#}", e)))
    }

    fn source_type(&self) -> SourceType {
        SourceType::FlatFile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;
    use serde_json::json;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.csv"), "id,customer_id,total\n1,10,5.5\n2,10,7.25\n3,11,1.0\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_introspect_csv() {
        let dir = fixture_dir();
        let driver = FlatFileDriver::from_directory(dir.path()).unwrap();

        let tables = driver.introspect("files").await.unwrap();
        assert_eq!(tables.len(), 1);
        let orders = &tables[0];
        assert_eq!(orders.table_name, "orders");
        assert_eq!(orders.table_type, TableType::File);
        assert_eq!(orders.column("id").unwrap().data_type, DataType::Integer);
        assert_eq!(orders.column("total").unwrap().data_type, DataType::Decimal);
    }

    #[tokio::test]
    async fn test_query_csv() {
        let dir = fixture_dir();
        let driver = FlatFileDriver::from_directory(dir.path()).unwrap();

        let result = driver
            .query(
                "files",
                "SELECT \"o\".\"id\" AS \"o.id\" FROM \"public\".\"orders\" AS \"o\" WHERE \"o\".\"customer_id\" = 10 ORDER BY \"o\".\"id\"",
            )
            .await
            .unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[1]["o.id"], json!(2));
    }

    #[test]
    fn test_missing_directory() {
        assert!(FlatFileDriver::from_directory("/definitely/not/here").is_err());
    }
}
