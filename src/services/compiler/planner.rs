// Federated planner
//
// Splits a multi-source descriptor at source boundaries. Tables of one source
// that are joined to each other form a group and compile to one native
// fragment; joins between groups become in-memory merge steps. Work that is
// not safe to run inside a fragment is deferred to the merge stage.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::api::middleware::AppError;
use crate::models::{
    ColumnRef, ComparisonOperator, DeferredFilter, FederatedPlan, Fragment, JoinCondition, JoinKey, JoinLogic,
    JoinType, MergeStep, NativeQuery, OutputColumn, OutputSource, SortKey, SortTarget, WhereClause,
};
use crate::services::compiler::dialect::SqlDialect;
use crate::services::compiler::sql_builder::{render_expr, render_where};
use crate::services::compiler::{join_tables, Resolved};

/// A cross-source join between two groups, oriented `left <join_type> right`
#[derive(Debug, Clone)]
struct GroupEdge {
    left: usize,
    right: usize,
    join_type: JoinType,
    /// (left key, right key)
    keys: Vec<(String, String)>,
}

impl GroupEdge {
    fn reversed(self) -> Self {
        GroupEdge {
            left: self.right,
            right: self.left,
            join_type: self.join_type.flipped(),
            keys: self.keys.into_iter().map(|(l, r)| (r, l)).collect(),
        }
    }
}

/// Connected same-source table groups, numbered in declaration order
struct TableGroups {
    groups: Vec<Vec<String>>,
    by_alias: HashMap<String, usize>,
}

impl TableGroups {
    fn build(resolved: &Resolved, local_joins: &[&JoinCondition]) -> Self {
        let aliases = resolved.alias_names();
        let index: HashMap<&str, usize> = aliases.iter().enumerate().map(|(i, a)| (a.as_str(), i)).collect();
        let mut parent: Vec<usize> = (0..aliases.len()).collect();

        fn find(parent: &mut Vec<usize>, i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            let mut cur = i;
            while parent[cur] != root {
                let next = parent[cur];
                parent[cur] = root;
                cur = next;
            }
            root
        }

        for join in local_joins {
            let members: Vec<usize> = join.aliases().iter().filter_map(|a| index.get(a.as_str()).copied()).collect();
            for pair in members.windows(2) {
                let (a, b) = (find(&mut parent, pair[0]), find(&mut parent, pair[1]));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }

        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut root_to_group: HashMap<usize, usize> = HashMap::new();
        let mut by_alias = HashMap::new();
        for (i, alias) in aliases.iter().enumerate() {
            let root = find(&mut parent, i);
            let group = *root_to_group.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group].push(alias.clone());
            by_alias.insert(alias.clone(), group);
        }

        Self { groups, by_alias }
    }

    fn of(&self, alias: &str) -> Result<usize, AppError> {
        self.by_alias
            .get(alias)
            .copied()
            .ok_or_else(|| AppError::Compilation(format!("Unknown table alias '{}'", alias)))
    }

    fn describe(&self, group: usize) -> String {
        self.groups.get(group).map(|g| g.join(", ")).unwrap_or_default()
    }
}

fn is_cross_source(resolved: &Resolved, join: &JoinCondition) -> bool {
    let sources: BTreeSet<&str> = join.aliases().iter().filter_map(|a| resolved.source_of(a)).collect();
    sources.len() > 1
}

/// Validate one cross-source condition and orient it as a group edge
fn edge_for(groups: &TableGroups, join: &JoinCondition) -> Result<GroupEdge, AppError> {
    let left = groups.of(join.left.alias())?;
    let right = groups.of(join.right.alias())?;

    if join.join_logic == JoinLogic::Or && !join.additional_conditions.is_empty() {
        return Err(AppError::MergeSemantics(format!(
            "Cross-source join between '{}' and '{}' chains its conditions with OR",
            join.left.alias(),
            join.right.alias()
        )));
    }

    let mut keys = Vec::new();
    for predicate in join.predicates() {
        if predicate.operator != ComparisonOperator::Eq {
            return Err(AppError::Compilation(format!(
                "Cross-source join between '{}' and '{}' uses operator '{}'; only equality can be merged",
                predicate.left.alias(),
                predicate.right.alias(),
                predicate.operator.symbol()
            )));
        }

        let (pl, pr) = (groups.of(predicate.left.alias())?, groups.of(predicate.right.alias())?);
        let (lkey, rkey) = (predicate.left.column_ref().key(), predicate.right.column_ref().key());
        if pl == left && pr == right {
            keys.push((lkey, rkey));
        } else if pl == right && pr == left {
            keys.push((rkey, lkey));
        } else {
            return Err(AppError::MergeSemantics(format!(
                "Join condition '{}' mixes predicates across more than two table groups",
                if join.id.is_empty() { "<unnamed>" } else { &join.id }
            )));
        }
    }

    Ok(GroupEdge {
        left,
        right,
        join_type: join.join_type,
        keys,
    })
}

/// Fold every cross-source condition into one edge per pair of groups
fn collect_edges(groups: &TableGroups, cross_joins: &[&JoinCondition]) -> Result<Vec<GroupEdge>, AppError> {
    let mut edges: Vec<GroupEdge> = Vec::new();

    for join in cross_joins {
        let edge = edge_for(groups, join)?;
        if edge.left == edge.right {
            return Err(AppError::MergeSemantics(format!(
                "Cross-source join between '{}' and '{}' stays inside one table group",
                join.left.alias(),
                join.right.alias()
            )));
        }

        match edges
            .iter_mut()
            .find(|e| (e.left == edge.left && e.right == edge.right) || (e.left == edge.right && e.right == edge.left))
        {
            Some(existing) => {
                let edge = if existing.left == edge.left { edge } else { edge.reversed() };
                if existing.join_type != edge.join_type {
                    return Err(AppError::MergeSemantics(format!(
                        "Conflicting join types {} and {} between tables [{}] and [{}]",
                        existing.join_type.as_str(),
                        edge.join_type.as_str(),
                        groups.describe(existing.left),
                        groups.describe(existing.right)
                    )));
                }
                existing.keys.extend(edge.keys);
            }
            None => edges.push(edge),
        }
    }

    Ok(edges)
}

/// Order the edges into merge steps starting at the root group
fn order_merges(groups: &TableGroups, root: usize, edges: Vec<GroupEdge>) -> Result<Vec<MergeStep>, AppError> {
    let mut merged: HashSet<usize> = HashSet::from([root]);
    let mut steps = Vec::new();
    let mut pending = edges;

    while !pending.is_empty() {
        let before = pending.len();
        let mut remaining = Vec::new();

        for edge in pending {
            match (merged.contains(&edge.left), merged.contains(&edge.right)) {
                (true, true) => {
                    return Err(AppError::MergeSemantics(format!(
                        "Cross-source joins form a cycle through tables [{}] and [{}]",
                        groups.describe(edge.left),
                        groups.describe(edge.right)
                    )));
                }
                (true, false) => {
                    merged.insert(edge.right);
                    steps.push(MergeStep {
                        fragment: edge.right,
                        join_type: edge.join_type,
                        keys: edge
                            .keys
                            .into_iter()
                            .map(|(accumulated, fragment)| JoinKey { accumulated, fragment })
                            .collect(),
                    });
                }
                (false, true) => {
                    let edge = edge.reversed();
                    merged.insert(edge.right);
                    steps.push(MergeStep {
                        fragment: edge.right,
                        join_type: edge.join_type,
                        keys: edge
                            .keys
                            .into_iter()
                            .map(|(accumulated, fragment)| JoinKey { accumulated, fragment })
                            .collect(),
                    });
                }
                (false, false) => remaining.push(edge),
            }
        }

        if remaining.len() == before {
            break;
        }
        pending = remaining;
    }

    if let Some(unjoined) = (0..groups.groups.len()).find(|g| !merged.contains(g)) {
        return Err(AppError::Compilation(format!(
            "Tables [{}] are not connected to the root table by any join",
            groups.describe(unjoined)
        )));
    }

    Ok(steps)
}

/// Groups whose rows may be replaced by NULLs during the merge
fn null_supplied_groups(root: usize, steps: &[MergeStep]) -> HashSet<usize> {
    let mut merged = vec![root];
    let mut nullable = HashSet::new();

    for step in steps {
        match step.join_type {
            JoinType::Inner => {}
            JoinType::Left => {
                nullable.insert(step.fragment);
            }
            JoinType::Right => nullable.extend(merged.iter().copied()),
            JoinType::Full => {
                nullable.extend(merged.iter().copied());
                nullable.insert(step.fragment);
            }
        }
        merged.push(step.fragment);
    }

    nullable
}

/// Per-fragment projection state
#[derive(Default)]
struct FragmentColumns {
    raw: Vec<ColumnRef>,
    expressions: Vec<(String, String)>,
    filters: Vec<WhereClause>,
}

impl FragmentColumns {
    fn need(&mut self, column: ColumnRef) {
        if !self.raw.contains(&column) {
            self.raw.push(column);
        }
    }
}

pub(crate) fn plan_federated(resolved: &Resolved) -> Result<FederatedPlan, AppError> {
    let descriptor = resolved.descriptor;

    let (cross, local): (Vec<&JoinCondition>, Vec<&JoinCondition>) =
        descriptor.joins.iter().partition(|j| is_cross_source(resolved, j));

    let groups = TableGroups::build(resolved, &local);
    let root = groups.of(&descriptor.root_table)?;
    let edges = collect_edges(&groups, &cross)?;
    let merge_steps = order_merges(&groups, root, edges)?;
    let nullable = null_supplied_groups(root, &merge_steps);

    let mut fragments: Vec<FragmentColumns> = (0..groups.groups.len()).map(|_| FragmentColumns::default()).collect();
    let group_of_key = |column: &ColumnRef| groups.of(&column.table_alias);

    for join in &cross {
        for predicate in join.predicates() {
            for column in [predicate.left.column_ref(), predicate.right.column_ref()] {
                fragments[group_of_key(&column)?].need(column);
            }
        }
    }

    // Filters: pushed into their fragment unless OR-chained or null-supplied
    let where_clauses = &descriptor.options.where_clauses;
    let has_or = where_clauses.iter().skip(1).any(|c| c.connective == JoinLogic::Or);
    let mut filters = Vec::new();
    for clause in where_clauses {
        let group = group_of_key(&clause.column)?;
        if !has_or && !nullable.contains(&group) {
            fragments[group].filters.push(clause.clone());
        } else {
            fragments[group].need(clause.column.clone());
            filters.push(DeferredFilter {
                key: clause.column.key(),
                operator: clause.operator,
                value: clause.value.clone(),
                connective: clause.connective,
            });
        }
    }

    // Outputs: raw columns by key, single-group scalar expressions pushed
    // down, everything else evaluated after the merge
    let mut outputs = Vec::new();
    for (idx, output) in resolved.outputs.iter().enumerate() {
        if let Some(column) = &output.raw {
            fragments[group_of_key(column)?].need(column.clone());
            outputs.push(OutputColumn {
                name: output.name.clone(),
                source: OutputSource::Key { key: column.key() },
            });
            continue;
        }

        let referenced = output.expr.referenced_columns();
        let touched: BTreeSet<usize> = referenced
            .iter()
            .map(&group_of_key)
            .collect::<Result<_, _>>()?;
        let pushable = !output.expr.is_aggregate() && touched.len() == 1;

        match touched.iter().next() {
            Some(&group) if pushable && !nullable.contains(&group) => {
                let key = format!("expr.{}", idx);
                let dialect = fragment_dialect(resolved, &groups.groups[group])?;
                fragments[group].expressions.push((render_expr(&output.expr, dialect), key.clone()));
                outputs.push(OutputColumn {
                    name: output.name.clone(),
                    source: OutputSource::Key { key },
                });
            }
            _ => {
                for column in referenced {
                    fragments[group_of_key(&column)?].need(column);
                }
                outputs.push(OutputColumn {
                    name: output.name.clone(),
                    source: OutputSource::Expr {
                        expr: output.expr.clone(),
                    },
                });
            }
        }
    }

    let mut group_by = Vec::new();
    for column in &descriptor.options.group_by {
        fragments[group_of_key(column)?].need(column.clone());
        group_by.push(column.key());
    }

    let mut order_by = Vec::new();
    for order in &descriptor.options.order_by {
        let target = match &order.table_alias {
            Some(alias) => {
                let column = ColumnRef::new(alias.clone(), order.column.clone());
                fragments[group_of_key(&column)?].need(column.clone());
                SortTarget::Raw { key: column.key() }
            }
            None => SortTarget::Output {
                name: order.column.clone(),
            },
        };
        order_by.push(SortKey {
            target,
            direction: order.direction,
        });
    }

    let mut built = Vec::with_capacity(fragments.len());
    for (id, columns) in fragments.into_iter().enumerate() {
        built.push(build_fragment(resolved, id, &groups.groups[id], columns)?);
    }

    tracing::info!(
        "Federated plan: {} fragments over {} sources, {} merge steps, {} deferred filters",
        built.len(),
        descriptor.data_source_ids().len(),
        merge_steps.len(),
        filters.len()
    );

    Ok(FederatedPlan {
        fragments: built,
        root_fragment: root,
        merge_steps,
        filters,
        outputs,
        group_by,
        order_by,
        offset: descriptor.options.offset,
        limit: descriptor.options.limit,
        columns: resolved.column_descriptors(),
    })
}

fn fragment_dialect(resolved: &Resolved, aliases: &[String]) -> Result<SqlDialect, AppError> {
    let first = aliases
        .first()
        .ok_or_else(|| AppError::Internal("Empty table group".to_string()))?;
    resolved
        .source_type_of(first)
        .map(SqlDialect::for_source)
        .ok_or_else(|| AppError::Compilation(format!("Unknown table alias '{}'", first)))
}

fn build_fragment(
    resolved: &Resolved,
    id: usize,
    aliases: &[String],
    columns: FragmentColumns,
) -> Result<Fragment, AppError> {
    let descriptor = resolved.descriptor;
    let dialect = fragment_dialect(resolved, aliases)?;
    let source_type = resolved
        .source_type_of(&aliases[0])
        .ok_or_else(|| AppError::Compilation(format!("Unknown table alias '{}'", aliases[0])))?;
    let source_id = resolved.source_of(&aliases[0]).unwrap_or_default().to_string();

    let root = if aliases.contains(&descriptor.root_table) {
        descriptor.root_table.as_str()
    } else {
        aliases[0].as_str()
    };
    let local_joins: Vec<&JoinCondition> = descriptor
        .joins
        .iter()
        .filter(|j| j.aliases().iter().all(|a| aliases.contains(a)))
        .collect();

    let mut stmt = join_tables(resolved, aliases, root, &local_joins, dialect)?;

    for column in &columns.raw {
        stmt.projections
            .push((dialect.qualified_column(&column.table_alias, &column.column), column.key()));
    }
    stmt.projections.extend(columns.expressions);

    let filters: Vec<&WhereClause> = columns.filters.iter().collect();
    if let Some(filter) = render_where(&filters, dialect) {
        stmt.and_where(filter);
    }

    let output_columns = stmt.projections.iter().map(|(_, alias)| alias.clone()).collect();
    Ok(Fragment {
        id,
        aliases: aliases.to_vec(),
        query: NativeQuery {
            source_id,
            source_type,
            sql: stmt.render(dialect),
            output_columns,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AggregateFunction, CalculatedColumn, CompiledPlan, Expr, FilterOperator, JoinPredicate, JoinSide, QueryDescriptor,
        ScalarFunction, SourceType, TableMetadata,
    };
    use crate::services::compiler::QueryCompiler;
    use crate::services::fixtures::*;
    use serde_json::json;

    fn cross_source(join_type: JoinType) -> (Vec<TableMetadata>, QueryDescriptor) {
        let c = customers("a", SourceType::Postgres);
        let o = orders("b", SourceType::MySql);
        let descriptor = descriptor(
            "c",
            vec![alias_of(&c, "c"), alias_of(&o, "o")],
            vec![select(&c, "c", "name"), select(&o, "o", "total")],
            vec![join(side(&c, "c", "id"), side(&o, "o", "customer_id"), join_type)],
        );
        (vec![c, o], descriptor)
    }

    fn federate(metadata: &[TableMetadata], descriptor: &QueryDescriptor) -> Result<FederatedPlan, AppError> {
        match QueryCompiler::new(metadata).compile(descriptor)? {
            CompiledPlan::Federated(plan) => Ok(plan),
            CompiledPlan::Single(_) => panic!("expected a federated plan"),
        }
    }

    fn where_clause(alias: &str, column: &str, operator: FilterOperator, value: serde_json::Value) -> WhereClause {
        WhereClause {
            column: ColumnRef::new(alias, column),
            operator,
            value,
            connective: JoinLogic::And,
        }
    }

    #[test]
    fn test_cross_source_join_splits_into_fragments() {
        let (metadata, descriptor) = cross_source(JoinType::Left);
        let plan = federate(&metadata, &descriptor).unwrap();

        assert_eq!(plan.fragments.len(), 2);
        assert_eq!(plan.root_fragment, 0);
        assert_eq!(
            plan.fragments[0].query.sql,
            "SELECT \"c\".\"id\" AS \"c.id\", \"c\".\"name\" AS \"c.name\" FROM \"public\".\"customers\" AS \"c\""
        );
        assert_eq!(
            plan.fragments[1].query.sql,
            "SELECT `o`.`customer_id` AS `o.customer_id`, `o`.`total` AS `o.total` FROM `public`.`orders` AS `o`"
        );
        assert_eq!(
            plan.merge_steps,
            vec![MergeStep {
                fragment: 1,
                join_type: JoinType::Left,
                keys: vec![JoinKey {
                    accumulated: "c.id".to_string(),
                    fragment: "o.customer_id".to_string(),
                }],
            }]
        );
        assert_eq!(
            plan.outputs[1].source,
            OutputSource::Key {
                key: "o.total".to_string()
            }
        );
    }

    #[test]
    fn test_filters_on_null_supplied_side_are_deferred() {
        let (metadata, mut descriptor) = cross_source(JoinType::Left);
        descriptor.options.where_clauses = vec![
            where_clause("c", "country", FilterOperator::Eq, json!("UK")),
            where_clause("o", "total", FilterOperator::Gt, json!(10)),
        ];
        let plan = federate(&metadata, &descriptor).unwrap();

        assert!(plan.fragments[0].query.sql.ends_with("WHERE \"c\".\"country\" = 'UK'"));
        assert!(!plan.fragments[1].query.sql.contains("WHERE"));
        assert_eq!(plan.filters.len(), 1);
        assert_eq!(plan.filters[0].key, "o.total");
    }

    #[test]
    fn test_or_connected_filters_are_all_deferred() {
        let (metadata, mut descriptor) = cross_source(JoinType::Inner);
        let mut second = where_clause("o", "total", FilterOperator::Gt, json!(10));
        second.connective = JoinLogic::Or;
        descriptor.options.where_clauses = vec![where_clause("c", "country", FilterOperator::Eq, json!("UK")), second];
        let plan = federate(&metadata, &descriptor).unwrap();

        assert!(plan.fragments.iter().all(|f| !f.query.sql.contains("WHERE")));
        assert_eq!(plan.filters.len(), 2);
        assert!(plan.fragments[0].query.output_columns.contains(&"c.country".to_string()));
    }

    #[test]
    fn test_expression_pushdown_rules() {
        let (metadata, mut descriptor) = cross_source(JoinType::Left);
        descriptor.calculated_columns = vec![
            CalculatedColumn {
                name: "upper_name".to_string(),
                expression: Expr::Function {
                    function: ScalarFunction::Upper,
                    args: vec![Expr::column("c", "name")],
                },
            },
            CalculatedColumn {
                name: "total_or_zero".to_string(),
                expression: Expr::Function {
                    function: ScalarFunction::Coalesce,
                    args: vec![Expr::column("o", "total"), Expr::literal(json!(0))],
                },
            },
            CalculatedColumn {
                name: "revenue".to_string(),
                expression: Expr::Aggregate {
                    function: AggregateFunction::Sum,
                    arg: Box::new(Expr::column("o", "total")),
                    distinct: false,
                },
            },
        ];
        let plan = federate(&metadata, &descriptor).unwrap();

        assert_eq!(plan.outputs[2].source, OutputSource::Key { key: "expr.2".to_string() });
        assert!(plan.fragments[0].query.sql.contains("UPPER(\"c\".\"name\") AS \"expr.2\""));
        // o is null-supplied, so COALESCE must see the merged NULL
        assert!(matches!(plan.outputs[3].source, OutputSource::Expr { .. }));
        assert!(matches!(plan.outputs[4].source, OutputSource::Expr { .. }));
        assert!(plan.is_grouped());
    }

    #[test]
    fn test_cross_source_non_equality_is_rejected() {
        let (metadata, mut descriptor) = cross_source(JoinType::Inner);
        descriptor.joins[0].operator = ComparisonOperator::Lt;
        assert!(matches!(federate(&metadata, &descriptor), Err(AppError::Compilation(_))));
    }

    #[test]
    fn test_cross_source_or_chain_is_rejected() {
        let (metadata, mut descriptor) = cross_source(JoinType::Inner);
        let extra = JoinPredicate {
            left: descriptor.joins[0].left.clone(),
            right: JoinSide {
                column: "id".to_string(),
                ..descriptor.joins[0].right.clone()
            },
            operator: ComparisonOperator::Eq,
        };
        descriptor.joins[0].additional_conditions.push(extra);
        descriptor.joins[0].join_logic = JoinLogic::Or;
        assert!(matches!(federate(&metadata, &descriptor), Err(AppError::MergeSemantics(_))));

        descriptor.joins[0].join_logic = JoinLogic::And;
        let plan = federate(&metadata, &descriptor).unwrap();
        assert_eq!(plan.merge_steps[0].keys.len(), 2);
    }

    #[test]
    fn test_join_types_between_groups() {
        let (metadata, mut descriptor) = cross_source(JoinType::Left);
        let c = &metadata[0];
        let o = &metadata[1];

        // The same join seen from the other side agrees
        descriptor.joins.push(join(side(o, "o", "id"), side(c, "c", "id"), JoinType::Right));
        let plan = federate(&metadata, &descriptor).unwrap();
        assert_eq!(plan.merge_steps.len(), 1);
        assert_eq!(plan.merge_steps[0].keys[1].accumulated, "c.id");
        assert_eq!(plan.merge_steps[0].keys[1].fragment, "o.id");

        descriptor.joins[1].join_type = JoinType::Inner;
        assert!(matches!(federate(&metadata, &descriptor), Err(AppError::MergeSemantics(_))));
    }

    #[test]
    fn test_local_joins_stay_inside_one_fragment() {
        let c = customers("a", SourceType::Postgres);
        let o = orders("b", SourceType::Postgres);
        let p = payments("b", SourceType::Postgres);
        let descriptor = descriptor(
            "c",
            vec![alias_of(&c, "c"), alias_of(&o, "o"), alias_of(&p, "p")],
            vec![select(&c, "c", "name"), select(&p, "p", "amount")],
            vec![
                join(side(&c, "c", "id"), side(&o, "o", "customer_id"), JoinType::Inner),
                join(side(&p, "p", "order_id"), side(&o, "o", "id"), JoinType::Inner),
            ],
        );
        let plan = federate(&[c, o, p], &descriptor).unwrap();

        assert_eq!(plan.fragments.len(), 2);
        assert_eq!(plan.fragments[1].aliases, vec!["o".to_string(), "p".to_string()]);
        assert!(plan.fragments[1]
            .query
            .sql
            .contains("FROM \"public\".\"orders\" AS \"o\" INNER JOIN \"public\".\"payments\" AS \"p\" ON \"p\".\"order_id\" = \"o\".\"id\""));
    }

    #[test]
    fn test_unconnected_group_is_rejected() {
        let c = customers("a", SourceType::Postgres);
        let o = orders("b", SourceType::Postgres);
        let p = payments("a", SourceType::Postgres);
        let descriptor = descriptor(
            "c",
            vec![alias_of(&c, "c"), alias_of(&o, "o"), alias_of(&p, "p")],
            vec![select(&c, "c", "name")],
            vec![join(side(&c, "c", "id"), side(&o, "o", "customer_id"), JoinType::Inner)],
        );
        let err = federate(&[c, o, p], &descriptor).unwrap_err();
        assert!(matches!(err, AppError::Compilation(ref msg) if msg.contains("[p]")));
    }

    #[test]
    fn test_cyclic_cross_source_joins_are_rejected() {
        let c = customers("a", SourceType::Postgres);
        let o = orders("b", SourceType::Postgres);
        let p = payments("c", SourceType::Postgres);
        let descriptor = descriptor(
            "c",
            vec![alias_of(&c, "c"), alias_of(&o, "o"), alias_of(&p, "p")],
            vec![select(&c, "c", "name")],
            vec![
                join(side(&c, "c", "id"), side(&o, "o", "customer_id"), JoinType::Inner),
                join(side(&o, "o", "id"), side(&p, "p", "order_id"), JoinType::Inner),
                join(side(&p, "p", "id"), side(&c, "c", "id"), JoinType::Inner),
            ],
        );
        assert!(matches!(federate(&[c, o, p], &descriptor), Err(AppError::MergeSemantics(_))));
    }
}
