use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::query::JoinType;

/// Identifies one table inside one data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub data_source_id: String,
    #[serde(default)]
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(data_source_id: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

/// One side of a catalogued join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogSide {
    pub data_source_id: String,
    #[serde(default)]
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl CatalogSide {
    pub fn new(
        data_source_id: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.data_source_id.clone(), self.schema.clone(), self.table.clone())
    }

    pub fn is_on(&self, table: &TableRef) -> bool {
        self.data_source_id == table.data_source_id && self.schema == table.schema && self.table == table.table
    }
}

/// A join confirmed by a user, as submitted for saving
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinDefinition {
    pub left: CatalogSide,
    pub right: CatalogSide,
    pub join_type: JoinType,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl JoinDefinition {
    /// Orientation-insensitive form: the smaller side is always on the left.
    /// Returns whether the sides were swapped.
    pub fn canonical(&self) -> (JoinDefinition, bool) {
        if self.left <= self.right {
            (self.clone(), false)
        } else {
            (
                JoinDefinition {
                    left: self.right.clone(),
                    right: self.left.clone(),
                    join_type: self.join_type.flipped(),
                    created_by: self.created_by.clone(),
                },
                true,
            )
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinCatalogEntry {
    pub id: String,
    pub left: CatalogSide,
    pub right: CatalogSide,
    pub join_type: JoinType,
    pub usage_count: i64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Schema hash of each side when the join was last confirmed
    pub left_schema_hash: String,
    pub right_schema_hash: String,
}

impl JoinCatalogEntry {
    /// The entry seen with `left` as its left side
    pub fn oriented_to(&self, left: &TableRef) -> JoinCatalogEntry {
        if self.left.is_on(left) {
            self.clone()
        } else {
            JoinCatalogEntry {
                left: self.right.clone(),
                right: self.left.clone(),
                join_type: self.join_type.flipped(),
                left_schema_hash: self.right_schema_hash.clone(),
                right_schema_hash: self.left_schema_hash.clone(),
                ..self.clone()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionOrigin {
    Catalog,
    ForeignKey,
    Heuristic,
}

/// A ranked, advisory join-key candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinSuggestion {
    pub left: CatalogSide,
    pub right: CatalogSide,
    pub join_type: JoinType,
    pub confidence: f64,
    pub origin: SuggestionOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_entry_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<i64>,
    pub reason: String,
}

/// Request body for join suggestions between two tables
#[derive(Debug, Deserialize)]
pub struct SuggestionRequest {
    pub left: TableRef,
    pub right: TableRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_orientation_flips_join_type() {
        let def = JoinDefinition {
            left: CatalogSide::new("b", "public", "orders", "customer_id"),
            right: CatalogSide::new("a", "public", "customers", "id"),
            join_type: JoinType::Left,
            created_by: None,
        };
        let (canonical, swapped) = def.canonical();
        assert!(swapped);
        assert_eq!(canonical.left.data_source_id, "a");
        assert_eq!(canonical.join_type, JoinType::Right);

        let (again, swapped_again) = canonical.canonical();
        assert!(!swapped_again);
        assert_eq!(again, canonical);
    }
}
