use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::services::join_suggestions::SuggestionConfig;
use crate::services::tenant::ConfiguredTenantLimits;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub execution: ExecutionConfig,
    pub tenants: TenantConfig,
    pub suggestions: SuggestionConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Location of the join catalog database
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound for a single native query
    pub timeout_secs: u64,
    /// Connection pool size for relational sources without their own setting
    pub max_pool_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    pub default_row_limit: i64,
    #[serde(default)]
    pub overrides: HashMap<String, i64>,
}

/// A data source registered at start-up
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub source_type: String,
    /// Connection URL, directory or JSON file depending on the type
    #[serde(default)]
    pub url: String,
    pub pool_size: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file first so its values count as overrides
        let _ = dotenv::dotenv();

        let defaults = SuggestionConfig::default();
        let mut builder = config::Config::builder()
            .set_default("database.url", "./join_catalog.db")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?
            .set_default("execution.timeout_secs", 60)?
            .set_default("execution.max_pool_size", 16)?
            .set_default("tenants.default_row_limit", -1)?
            .set_default("suggestions.min_confidence", defaults.min_confidence)?
            .set_default("suggestions.exact_name_confidence", defaults.exact_name_confidence)?
            .set_default("suggestions.key_convention_confidence", defaults.key_convention_confidence)?
            .set_default("suggestions.bare_id_confidence", defaults.bare_id_confidence)?
            .set_default("suggestions.fuzzy_confidence", defaults.fuzzy_confidence)?
            .set_default("suggestions.fuzzy_max_edit_distance", defaults.fuzzy_max_edit_distance as u64)?;

        // Source lists and tenant overrides only fit in a file
        let file = env::var("CONFIG_FILE").unwrap_or_else(|_| "model-query".to_string());
        builder = builder.add_source(config::File::with_name(&file).required(false));

        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(timeout) = env::var("QUERY_TIMEOUT_SECS") {
            builder = builder.set_override("execution.timeout_secs", timeout.parse::<u64>().unwrap_or(60))?;
        }

        if let Ok(size) = env::var("MAX_POOL_SIZE") {
            builder = builder.set_override("execution.max_pool_size", size.parse::<u64>().unwrap_or(16))?;
        }

        if let Ok(limit) = env::var("DEFAULT_ROW_LIMIT") {
            builder = builder.set_override("tenants.default_row_limit", limit.parse::<i64>().unwrap_or(-1))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    pub fn pool_size_for(&self, source: &SourceConfig) -> usize {
        source.pool_size.unwrap_or(self.execution.max_pool_size).max(1)
    }
}

impl TenantConfig {
    pub fn limits(&self) -> ConfiguredTenantLimits {
        self.overrides
            .iter()
            .fold(ConfiguredTenantLimits::new(self.default_row_limit), |limits, (tenant, limit)| {
                limits.with_override(tenant.clone(), *limit)
            })
    }
}
