// Query Compiler
//
// Turns a QueryDescriptor into a CompiledPlan. Every referenced table and
// column is checked against introspected metadata first; a descriptor whose
// tables all live in one source compiles to a single native query, anything
// else goes through the federated planner.

pub mod dialect;
pub mod planner;
pub mod sql_builder;

pub use dialect::SqlDialect;

use std::collections::{BTreeSet, HashMap};

use crate::api::middleware::AppError;
use crate::models::{
    ColumnDescriptor, ColumnRef, CompiledPlan, DataType, Expr, JoinCondition, NativeQuery, QueryDescriptor,
    SinglePlan, SortDirection, SourceType, TableAlias, TableMetadata,
};
use crate::validation::SqlValidator;
use sql_builder::{render_expr, render_join_predicates, render_where, JoinClause, SelectStatement, TableSource};

/// One projected output of the descriptor, in output order
#[derive(Debug, Clone)]
pub(crate) struct OutputDef {
    pub name: String,
    pub expr: Expr,
    /// Set when the output is a bare column
    pub raw: Option<ColumnRef>,
    pub data_type: DataType,
    pub source_ids: BTreeSet<String>,
}

/// A descriptor whose references have all been checked against metadata
pub(crate) struct Resolved<'a> {
    pub descriptor: &'a QueryDescriptor,
    pub tables: HashMap<String, &'a TableMetadata>,
    pub outputs: Vec<OutputDef>,
}

impl<'a> Resolved<'a> {
    pub fn alias_names(&self) -> Vec<String> {
        self.descriptor.tables.iter().map(|t| t.alias.clone()).collect()
    }

    pub fn declared(&self, alias: &str) -> Option<&TableAlias> {
        self.descriptor.table(alias)
    }

    pub fn source_of(&self, alias: &str) -> Option<&str> {
        self.declared(alias).map(|t| t.data_source_id.as_str())
    }

    pub fn source_type_of(&self, alias: &str) -> Option<SourceType> {
        self.tables.get(alias).map(|t| t.data_source_type)
    }

    pub fn table_source(&self, alias: &str) -> Option<TableSource> {
        let meta = self.tables.get(alias)?;
        Some(TableSource {
            schema: meta.schema_name.clone(),
            table: meta.table_name.clone(),
            alias: alias.to_string(),
        })
    }

    /// Expressions to group by: the declared columns, plus every
    /// non-aggregate output when aggregates are projected
    pub fn grouping_exprs(&self) -> Vec<Expr> {
        let mut exprs: Vec<Expr> = self
            .descriptor
            .options
            .group_by
            .iter()
            .map(|c| Expr::column(c.table_alias.clone(), c.column.clone()))
            .collect();

        if self.outputs.iter().any(|o| o.expr.is_aggregate()) {
            for output in self.outputs.iter().filter(|o| !o.expr.is_aggregate()) {
                if !exprs.contains(&output.expr) {
                    exprs.push(output.expr.clone());
                }
            }
        }
        exprs
    }

    /// Once rows are grouped, a table column is only sortable when it is one
    /// of the grouping expressions
    fn check_grouped_sort(&self) -> Result<(), AppError> {
        let grouped =
            !self.descriptor.options.group_by.is_empty() || self.outputs.iter().any(|o| o.expr.is_aggregate());
        if !grouped {
            return Ok(());
        }

        let grouping = self.grouping_exprs();
        for order in &self.descriptor.options.order_by {
            let Some(alias) = &order.table_alias else {
                continue;
            };
            if !grouping.contains(&Expr::column(alias.clone(), order.column.clone())) {
                return Err(AppError::Compilation(format!(
                    "Cannot sort on '{}.{}': it is neither grouped nor aggregated",
                    alias, order.column
                )));
            }
        }
        Ok(())
    }

    pub fn column_descriptors(&self) -> Vec<ColumnDescriptor> {
        self.outputs
            .iter()
            .map(|o| ColumnDescriptor {
                name: o.name.clone(),
                data_type: o.data_type,
                data_source_id: if o.source_ids.len() == 1 { o.source_ids.iter().next().cloned() } else { None },
            })
            .collect()
    }
}

pub struct QueryCompiler {
    tables: Vec<TableMetadata>,
}

impl QueryCompiler {
    /// Build a compiler over the metadata of every source the descriptor may reference
    pub fn new(metadata: &[TableMetadata]) -> Self {
        Self {
            tables: metadata.to_vec(),
        }
    }

    pub fn compile(&self, descriptor: &QueryDescriptor) -> Result<CompiledPlan, AppError> {
        descriptor.validate().map_err(AppError::Compilation)?;
        let resolved = self.resolve(descriptor)?;

        let source_ids = descriptor.data_source_ids();
        let plan = if source_ids.len() == 1 {
            CompiledPlan::Single(Self::compile_single(&resolved)?)
        } else {
            CompiledPlan::Federated(planner::plan_federated(&resolved)?)
        };

        for query in plan.native_queries() {
            SqlValidator::validate_native(&query.sql, query.source_type).map_err(|e| {
                AppError::Compilation(format!(
                    "Generated query for source '{}' does not parse: {}",
                    query.source_id, e
                ))
            })?;
            tracing::debug!("Native query for source '{}': {}", query.source_id, query.sql);
        }

        tracing::info!(
            "Compiled descriptor over {} source(s) into {} native quer{}",
            source_ids.len(),
            plan.native_queries().len(),
            if plan.native_queries().len() == 1 { "y" } else { "ies" }
        );
        Ok(plan)
    }

    fn find_table(&self, declared: &TableAlias) -> Option<&TableMetadata> {
        self.tables.iter().find(|t| {
            t.data_source_id == declared.data_source_id
                && t.table_name == declared.table
                && (declared.schema.is_empty() || t.schema_name == declared.schema)
        })
    }

    fn resolve<'a>(&'a self, descriptor: &'a QueryDescriptor) -> Result<Resolved<'a>, AppError> {
        let mut tables = HashMap::new();
        for declared in &descriptor.tables {
            let meta = self.find_table(declared).ok_or_else(|| {
                AppError::Compilation(format!(
                    "Unknown table '{}.{}' in data source '{}'",
                    declared.schema, declared.table, declared.data_source_id
                ))
            })?;
            tables.insert(declared.alias.clone(), meta);
        }

        let check = |alias: &str, column: &str| -> Result<(), AppError> {
            let table = tables
                .get(alias)
                .ok_or_else(|| AppError::Compilation(format!("Unknown table alias '{}'", alias)))?;
            match table.column(column) {
                Some(_) => Ok(()),
                None => Err(AppError::Compilation(format!(
                    "Unknown column '{}' on table '{}' (alias '{}')",
                    column,
                    table.qualified_name(),
                    alias
                ))),
            }
        };
        let check_expr = |expr: &Expr| -> Result<(), AppError> {
            for col in expr.referenced_columns() {
                check(&col.table_alias, &col.column)?;
            }
            Ok(())
        };
        let type_of = |alias: &str, column: &str| -> DataType {
            tables
                .get(alias)
                .and_then(|t| t.column(column))
                .map(|c| c.data_type)
                .unwrap_or_default()
        };
        let sources_of = |expr: &Expr| -> BTreeSet<String> {
            expr.referenced_columns()
                .iter()
                .filter_map(|c| descriptor.table(&c.table_alias).map(|t| t.data_source_id.clone()))
                .collect()
        };

        let mut outputs = Vec::new();
        for column in descriptor.selected_columns() {
            let expr = column.expression();
            check_expr(&expr)?;
            let raw = expr.as_column();
            let data_type = match &raw {
                Some(col) => type_of(&col.table_alias, &col.column),
                None => expr.infer_type(&type_of),
            };
            outputs.push(OutputDef {
                name: column.display_name(),
                source_ids: sources_of(&expr),
                expr,
                raw,
                data_type,
            });
        }
        for calculated in &descriptor.calculated_columns {
            check_expr(&calculated.expression)?;
            outputs.push(OutputDef {
                name: calculated.name.clone(),
                expr: calculated.expression.clone(),
                raw: calculated.expression.as_column(),
                data_type: calculated.expression.infer_type(&type_of),
                source_ids: sources_of(&calculated.expression),
            });
        }

        for join in &descriptor.joins {
            for predicate in join.predicates() {
                check(predicate.left.alias(), &predicate.left.column)?;
                check(predicate.right.alias(), &predicate.right.column)?;
            }
        }
        for clause in &descriptor.options.where_clauses {
            check(&clause.column.table_alias, &clause.column.column)?;
        }
        for group in &descriptor.options.group_by {
            check(&group.table_alias, &group.column)?;
        }
        for order in &descriptor.options.order_by {
            match &order.table_alias {
                Some(alias) => {
                    check(alias, &order.column)?;
                }
                None => {
                    if !outputs.iter().any(|o| o.name == order.column) {
                        return Err(AppError::Compilation(format!(
                            "Sort column '{}' is neither a table column nor an output column",
                            order.column
                        )));
                    }
                }
            }
        }

        let resolved = Resolved {
            descriptor,
            tables,
            outputs,
        };
        resolved.check_grouped_sort()?;
        Ok(resolved)
    }

    fn compile_single(resolved: &Resolved) -> Result<SinglePlan, AppError> {
        let descriptor = resolved.descriptor;
        let root = descriptor.root_table.as_str();
        let source_id = resolved.source_of(root).unwrap_or_default().to_string();
        let source_type = resolved
            .source_type_of(root)
            .ok_or_else(|| AppError::Compilation(format!("Unknown table alias '{}'", root)))?;
        let dialect = SqlDialect::for_source(source_type);

        let joins: Vec<&JoinCondition> = descriptor.joins.iter().collect();
        let mut stmt = join_tables(resolved, &resolved.alias_names(), root, &joins, dialect)?;

        for output in &resolved.outputs {
            stmt.projections.push((render_expr(&output.expr, dialect), output.name.clone()));
        }

        let clauses: Vec<_> = descriptor.options.where_clauses.iter().collect();
        if let Some(filter) = render_where(&clauses, dialect) {
            stmt.and_where(filter);
        }
        stmt.group_by = resolved
            .grouping_exprs()
            .iter()
            .map(|e| render_expr(e, dialect))
            .collect();
        stmt.order_by = descriptor
            .options
            .order_by
            .iter()
            .map(|o| {
                let target = match &o.table_alias {
                    Some(alias) => dialect.qualified_column(alias, &o.column),
                    None => dialect.quote_ident(&o.column),
                };
                format!("{} {}", target, if o.direction == SortDirection::Desc { "DESC" } else { "ASC" })
            })
            .collect();
        stmt.limit = descriptor.options.limit;
        stmt.offset = descriptor.options.offset;

        Ok(SinglePlan {
            query: NativeQuery {
                source_id,
                source_type,
                sql: stmt.render(dialect),
                output_columns: resolved.outputs.iter().map(|o| o.name.clone()).collect(),
            },
            columns: resolved.column_descriptors(),
        })
    }
}

/// FROM and JOIN clauses for a set of same-source aliases.
///
/// Joins are attached in descriptor order. A join whose new table sits on
/// the left is mirrored (sides swapped, LEFT/RIGHT flipped); a join between
/// two tables already present extends the ON clause that introduced the later
/// one; a join touching no present table waits for a later pass.
pub(crate) fn join_tables(
    resolved: &Resolved,
    aliases: &[String],
    root: &str,
    joins: &[&JoinCondition],
    dialect: SqlDialect,
) -> Result<SelectStatement, AppError> {
    let source = |alias: &str| {
        resolved
            .table_source(alias)
            .ok_or_else(|| AppError::Compilation(format!("Unknown table alias '{}'", alias)))
    };

    let mut stmt = SelectStatement::new(source(root)?);
    let mut present: Vec<String> = vec![root.to_string()];
    let mut extra_conditions: Vec<String> = Vec::new();
    let mut pending: Vec<&JoinCondition> = joins.to_vec();

    while !pending.is_empty() {
        let mut remaining = Vec::new();
        let before = pending.len();

        for join in pending {
            let left = join.left.alias();
            let right = join.right.alias();
            let on = render_join_predicates(&join.predicates(), join.join_logic, dialect);

            match (present.iter().any(|a| a == left), present.iter().any(|a| a == right)) {
                (true, true) => {
                    let position = stmt
                        .joins
                        .iter()
                        .rposition(|c| c.table.alias == left || c.table.alias == right);
                    match position {
                        Some(idx) => stmt.joins[idx].on.push(on),
                        None => extra_conditions.push(on),
                    }
                }
                (true, false) => {
                    stmt.joins.push(JoinClause {
                        join_type: join.join_type,
                        table: source(right)?,
                        on: vec![on],
                    });
                    present.push(right.to_string());
                }
                (false, true) => {
                    stmt.joins.push(JoinClause {
                        join_type: join.join_type.flipped(),
                        table: source(left)?,
                        on: vec![on],
                    });
                    present.push(left.to_string());
                }
                (false, false) => remaining.push(join),
            }
        }

        if remaining.len() == before {
            break;
        }
        pending = remaining;
    }

    if let Some(unjoined) = aliases.iter().find(|a| !present.contains(a)) {
        return Err(AppError::Compilation(format!(
            "Table '{}' is not connected to '{}' by any join",
            unjoined, root
        )));
    }

    for condition in extra_conditions {
        stmt.and_where(condition);
    }

    Ok(stmt)
}
