// Source drivers: one implementation per supported source type
pub mod adapter;
pub mod document;
pub mod flat_file;
pub mod mysql;
pub mod postgresql;

pub use adapter::{QueryResult, RegisteredSource, SourceDriver, SourceRegistry};
pub use document::DocumentDriver;
pub use flat_file::FlatFileDriver;
pub use mysql::MySqlDriver;
pub use postgresql::PostgresDriver;

use crate::api::middleware::AppError;
use crate::models::SourceType;
use std::sync::Arc;
use std::time::Duration;

/// Factory function to create the driver for a configured source.
///
/// `location` is a connection URL for relational sources, a directory for
/// flat files and an optional JSON file for document collections.
/// `max_pool_size` bounds the connection pool of relational sources.
pub fn create_driver(
    source_type: SourceType,
    location: &str,
    timeout: Duration,
    max_pool_size: usize,
) -> Result<Arc<dyn SourceDriver>, AppError> {
    match source_type {
        SourceType::Postgres => Ok(Arc::new(PostgresDriver::connect(location, max_pool_size)?)),
        SourceType::MySql => Ok(Arc::new(MySqlDriver::connect(location, max_pool_size)?)),
        SourceType::FlatFile => Ok(Arc::new(FlatFileDriver::from_directory(location)?.with_timeout(timeout))),
        SourceType::Document if location.is_empty() => Ok(Arc::new(DocumentDriver::new().with_timeout(timeout))),
        SourceType::Document => Ok(Arc::new(DocumentDriver::from_json_file(location)?.with_timeout(timeout))),
    }
}
