// Query Descriptor Model
//
// The serializable, source-agnostic description of a data model query. The
// caller builds it, the compiler validates and compiles it, and it is never
// mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use crate::models::expression::{ColumnRef, Expr};
use crate::models::metadata::ColumnMetadata;

/// Value used by `offset` and `limit` to mean "not set"
pub const UNSET: i64 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }

    /// The same join seen from the other side
    pub fn flipped(&self) -> Self {
        match self {
            JoinType::Left => JoinType::Right,
            JoinType::Right => JoinType::Left,
            other => *other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "INNER" => Ok(JoinType::Inner),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            "FULL" => Ok(JoinType::Full),
            _ => Err(format!("Unsupported join type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ComparisonOperator {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "<>",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::LtEq => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::GtEq => ">=",
        }
    }
}

/// Connective joining a condition to the one before it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinLogic {
    #[default]
    And,
    Or,
}

impl JoinLogic {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            JoinLogic::And => "AND",
            JoinLogic::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinSide {
    #[serde(default)]
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub column: String,
}

impl JoinSide {
    pub fn alias(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => &self.table,
        }
    }

    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef::new(self.alias(), self.column.clone())
    }
}

/// A chained predicate inside a join condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinPredicate {
    pub left: JoinSide,
    pub right: JoinSide,
    #[serde(default)]
    pub operator: ComparisonOperator,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinCondition {
    #[serde(default)]
    pub id: String,
    pub left: JoinSide,
    pub right: JoinSide,
    pub join_type: JoinType,
    #[serde(default)]
    pub operator: ComparisonOperator,
    /// Connective used between the main predicate and every additional one
    #[serde(default)]
    pub join_logic: JoinLogic,
    #[serde(default)]
    pub additional_conditions: Vec<JoinPredicate>,
    #[serde(default)]
    pub is_auto_detected: bool,
}

impl JoinCondition {
    /// The main predicate followed by the chained ones
    pub fn predicates(&self) -> Vec<JoinPredicate> {
        let mut all = vec![JoinPredicate {
            left: self.left.clone(),
            right: self.right.clone(),
            operator: self.operator,
        }];
        all.extend(self.additional_conditions.iter().cloned());
        all
    }

    /// Every table alias touched by any predicate
    pub fn aliases(&self) -> BTreeSet<String> {
        self.predicates()
            .iter()
            .flat_map(|p| [p.left.alias().to_string(), p.right.alias().to_string()])
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhereClause {
    pub column: ColumnRef,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
    /// Connective to the previous clause; ignored on the first clause
    #[serde(default)]
    pub connective: JoinLogic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort key: a table column when `table_alias` is set, otherwise the name of
/// an output column (display name or calculated column)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBy {
    #[serde(default)]
    pub table_alias: Option<String>,
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

fn default_unset() -> i64 {
    UNSET
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryOptions {
    #[serde(default)]
    pub where_clauses: Vec<WhereClause>,
    #[serde(default)]
    pub group_by: Vec<ColumnRef>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default = "default_unset")]
    pub offset: i64,
    #[serde(default = "default_unset")]
    pub limit: i64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            where_clauses: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            offset: UNSET,
            limit: UNSET,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculatedColumn {
    pub name: String,
    pub expression: Expr,
}

/// A table participating in the query under an alias
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableAlias {
    pub alias: String,
    pub data_source_id: String,
    #[serde(default)]
    pub schema: String,
    pub table: String,
}

impl TableAlias {
    pub fn new(
        alias: impl Into<String>,
        data_source_id: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            data_source_id: data_source_id.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryDescriptor {
    /// Alias of the table every other table is joined onto
    pub root_table: String,
    pub tables: Vec<TableAlias>,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub options: QueryOptions,
    #[serde(default)]
    pub calculated_columns: Vec<CalculatedColumn>,
    #[serde(default)]
    pub joins: Vec<JoinCondition>,
}

/// Request body for executing a descriptor on behalf of a tenant
#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    pub tenant_id: String,
    pub descriptor: QueryDescriptor,
}

#[derive(Debug, Deserialize)]
pub struct CompileQueryRequest {
    pub descriptor: QueryDescriptor,
}

impl QueryDescriptor {
    pub fn table(&self, alias: &str) -> Option<&TableAlias> {
        self.tables.iter().find(|t| t.alias == alias)
    }

    pub fn selected_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.is_selected)
    }

    /// Distinct data sources referenced by the declared tables
    pub fn data_source_ids(&self) -> BTreeSet<String> {
        self.tables.iter().map(|t| t.data_source_id.clone()).collect()
    }

    /// Structural checks that need no metadata
    pub fn validate(&self) -> Result<(), String> {
        if self.tables.is_empty() {
            return Err("Query must reference at least one table".to_string());
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if table.alias.is_empty() {
                return Err(format!("Table '{}' has an empty alias", table.table));
            }
            if !seen.insert(table.alias.as_str()) {
                return Err(format!("Table alias '{}' is declared twice", table.alias));
            }
        }

        if self.table(&self.root_table).is_none() {
            return Err(format!("Root table '{}' is not declared", self.root_table));
        }

        if self.options.offset < UNSET || self.options.limit < UNSET {
            return Err("offset and limit must be -1 (unset) or non-negative".to_string());
        }

        if self.selected_columns().next().is_none() && self.calculated_columns.is_empty() {
            return Err("Query must select at least one column".to_string());
        }

        let mut names = HashSet::new();
        for name in self
            .selected_columns()
            .map(|c| c.display_name())
            .chain(self.calculated_columns.iter().map(|c| c.name.clone()))
        {
            if !names.insert(name.clone()) {
                return Err(format!("Output column '{}' appears twice", name));
            }
        }

        Ok(())
    }
}
