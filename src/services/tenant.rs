// Tenant row limits
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::api::middleware::AppError;

/// Looks up how many rows a tenant may receive from one query (-1 = unlimited)
#[async_trait]
pub trait TenantLimits: Send + Sync {
    async fn row_limit(&self, tenant_id: &str) -> Result<i64, AppError>;
}

/// Limits taken from configuration: a default plus per-tenant overrides
#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguredTenantLimits {
    #[serde(default = "unlimited")]
    pub default_row_limit: i64,
    #[serde(default)]
    pub overrides: HashMap<String, i64>,
}

fn unlimited() -> i64 {
    -1
}

impl ConfiguredTenantLimits {
    pub fn new(default_row_limit: i64) -> Self {
        Self {
            default_row_limit,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, tenant_id: impl Into<String>, row_limit: i64) -> Self {
        self.overrides.insert(tenant_id.into(), row_limit);
        self
    }
}

impl Default for ConfiguredTenantLimits {
    fn default() -> Self {
        Self::new(unlimited())
    }
}

#[async_trait]
impl TenantLimits for ConfiguredTenantLimits {
    async fn row_limit(&self, tenant_id: &str) -> Result<i64, AppError> {
        let limit = self.overrides.get(tenant_id).copied().unwrap_or(self.default_row_limit);
        if limit < -1 {
            return Err(AppError::Validation(format!(
                "Row limit for tenant '{}' must be -1 or non-negative, got {}",
                tenant_id, limit
            )));
        }
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overrides_win_over_default() {
        let limits = ConfiguredTenantLimits::new(1000).with_override("trial", 100);
        assert_eq!(limits.row_limit("trial").await.unwrap(), 100);
        assert_eq!(limits.row_limit("acme").await.unwrap(), 1000);
        assert_eq!(ConfiguredTenantLimits::default().row_limit("any").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_invalid_limit_is_rejected() {
        let limits = ConfiguredTenantLimits::new(-7);
        assert!(matches!(limits.row_limit("acme").await, Err(AppError::Validation(_))));
    }
}
