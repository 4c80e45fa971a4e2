// Embedded sessions for sources without a server of their own.
//
// Flat-file and document drivers open one context per native query, register
// their tables into it and drop it afterwards. Generated SQL always qualifies
// tables as "public"."name", so that is the default schema here.

use anyhow::{Context, Result};
use datafusion::execution::context::SessionConfig as EngineConfig;
use datafusion::prelude::*;

/// Schema every embedded table is registered under
pub const EMBEDDED_SCHEMA: &str = "public";

/// Tuning for embedded sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub batch_size: usize,
    /// Parallelism per query; at least 1
    pub target_partitions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: num_cpus::get(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataFusionSessionManager {
    config: SessionConfig,
}

impl DataFusionSessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// A fresh context whose unqualified table names resolve to `public`
    pub fn create_session(&self) -> Result<SessionContext> {
        let config = EngineConfig::new()
            .with_batch_size(self.config.batch_size)
            .with_target_partitions(self.config.target_partitions.max(1))
            .with_default_catalog_and_schema("datafusion", EMBEDDED_SCHEMA)
            .with_create_default_catalog_and_schema(true);

        let ctx = SessionContext::new_with_config(config);
        ctx.catalog("datafusion")
            .and_then(|catalog| catalog.schema(EMBEDDED_SCHEMA))
            .context("embedded session has no public schema")?;
        Ok(ctx)
    }
}
