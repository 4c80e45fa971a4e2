// Compiled Plan Model
//
// Output of the query compiler. A single-source plan is one native query; a
// federated plan is one native fragment per source-local table group plus the
// merge steps and post-merge work the coordinator performs in memory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::models::expression::Expr;
use crate::models::metadata::{DataType, SourceType};
use crate::models::query::{FilterOperator, JoinLogic, JoinType, SortDirection};

/// Describes one column of a tabular result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: DataType,
    /// Set when the column derives from exactly one data source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
}

/// A query in the native dialect of one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeQuery {
    pub source_id: String,
    pub source_type: SourceType,
    pub sql: String,
    /// Names of the projected columns, in order
    pub output_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SinglePlan {
    pub query: NativeQuery,
    pub columns: Vec<ColumnDescriptor>,
}

/// A native sub-query covering a connected group of tables in one source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fragment {
    pub id: usize,
    pub aliases: Vec<String>,
    pub query: NativeQuery,
}

/// One equality key of a merge step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinKey {
    /// Row key on the already merged side
    pub accumulated: String,
    /// Row key on the fragment being merged in
    pub fragment: String,
}

/// Joins one fragment onto everything merged so far:
/// `accumulated <join_type> fragment ON keys`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeStep {
    pub fragment: usize,
    pub join_type: JoinType,
    pub keys: Vec<JoinKey>,
}

/// A where clause evaluated in memory after the merge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeferredFilter {
    pub key: String,
    pub operator: FilterOperator,
    pub value: Value,
    pub connective: JoinLogic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputSource {
    /// Value already present in the merged row under this key
    Key { key: String },
    /// Evaluated in memory; column references use merged row keys
    Expr { expr: Expr },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub source: OutputSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SortTarget {
    /// A merged row key
    Raw { key: String },
    /// An output column name
    Output { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortKey {
    pub target: SortTarget,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FederatedPlan {
    pub fragments: Vec<Fragment>,
    pub root_fragment: usize,
    pub merge_steps: Vec<MergeStep>,
    pub filters: Vec<DeferredFilter>,
    pub outputs: Vec<OutputColumn>,
    /// Merged row keys to group by
    pub group_by: Vec<String>,
    pub order_by: Vec<SortKey>,
    pub offset: i64,
    pub limit: i64,
    pub columns: Vec<ColumnDescriptor>,
}

impl FederatedPlan {
    pub fn source_ids(&self) -> BTreeSet<String> {
        self.fragments.iter().map(|f| f.query.source_id.clone()).collect()
    }

    /// Whether the merged rows must be grouped before projection
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self.outputs.iter().any(|o| match &o.source {
                OutputSource::Expr { expr } => expr.is_aggregate(),
                OutputSource::Key { .. } => false,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledPlan {
    Single(SinglePlan),
    Federated(FederatedPlan),
}

impl CompiledPlan {
    pub fn is_federated(&self) -> bool {
        matches!(self, CompiledPlan::Federated(_))
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        match self {
            CompiledPlan::Single(plan) => &plan.columns,
            CompiledPlan::Federated(plan) => &plan.columns,
        }
    }

    /// Every native query the plan will dispatch
    pub fn native_queries(&self) -> Vec<&NativeQuery> {
        match self {
            CompiledPlan::Single(plan) => vec![&plan.query],
            CompiledPlan::Federated(plan) => plan.fragments.iter().map(|f| &f.query).collect(),
        }
    }
}
