pub mod catalog_reader; // Normalized metadata from every registered source
pub mod compiler;
pub mod database; // Source drivers and the registry
pub mod datafusion; // DataFusion sessions for flat files and documents
pub mod execution;
pub mod join_suggestions;
pub mod model_service;
pub mod schema_hash;
pub mod tenant;

#[cfg(test)]
pub mod fixtures;

pub use catalog_reader::SchemaCatalogReader;
pub use compiler::QueryCompiler;
pub use execution::ExecutionCoordinator;
pub use join_suggestions::{JoinCandidateGenerator, SuggestionConfig};
pub use model_service::ModelService;
pub use schema_hash::SchemaHashTracker;
pub use tenant::{ConfiguredTenantLimits, TenantLimits};
