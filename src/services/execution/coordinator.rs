// Execution Coordinator
//
// Runs compiled plans. Single-source plans go straight to their driver.
// Federated plans fetch every fragment (one task per source, fragments of a
// source in sequence), then merge, filter, group, sort, page and apply the
// tenant row limit in memory.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::api::middleware::AppError;
use crate::models::{
    apply_row_limit, CompiledPlan, FederatedPlan, Fragment, OutputSource, Row, SinglePlan, SortDirection, SortTarget,
    TabularResult,
};
use crate::services::database::{SourceDriver, SourceRegistry};
use crate::services::execution::evaluator::{apply_filters, canonical_key, compare_values, evaluate, evaluate_group};
use crate::services::execution::merge::hash_join;

/// One projected row plus the merged row it came from, kept for sorting on
/// columns that are not part of the output
struct Projected {
    output: Row,
    source: Row,
}

pub struct ExecutionCoordinator {
    registry: Arc<SourceRegistry>,
    timeout: Duration,
}

impl ExecutionCoordinator {
    pub fn new(registry: Arc<SourceRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Execute a compiled plan. `tenant_row_limit` of -1 means unlimited.
    pub async fn execute(&self, plan: &CompiledPlan, tenant_row_limit: i64) -> Result<TabularResult, AppError> {
        match plan {
            CompiledPlan::Single(plan) => self.execute_single(plan, tenant_row_limit).await,
            CompiledPlan::Federated(plan) => self.execute_federated(plan, tenant_row_limit).await,
        }
    }

    async fn execute_single(&self, plan: &SinglePlan, tenant_row_limit: i64) -> Result<TabularResult, AppError> {
        let start = Instant::now();
        let source_id = &plan.query.source_id;
        let driver = self.registry.driver(source_id).await?;

        let rows = fetch(driver.as_ref(), source_id, &plan.query.sql, self.timeout)
            .await
            .map_err(|e| e.for_source(source_id))?;

        let mut rows: Vec<Row> = rows
            .into_iter()
            .map(|row| {
                plan.query
                    .output_columns
                    .iter()
                    .map(|name| (name.clone(), row.get(name).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        let truncated = apply_row_limit(&mut rows, tenant_row_limit);

        tracing::info!(
            "Single-source query on '{}' returned {} rows{}",
            source_id,
            rows.len(),
            if truncated { " (truncated by tenant limit)" } else { "" }
        );

        Ok(TabularResult::new(
            plan.columns.clone(),
            rows,
            truncated,
            false,
            start.elapsed().as_millis(),
        ))
    }

    /// Fetch every fragment. The first failure aborts the remaining fetches
    /// and fails the whole request.
    async fn fetch_fragments(&self, plan: &FederatedPlan) -> Result<HashMap<usize, Vec<Row>>, AppError> {
        let mut by_source: BTreeMap<String, Vec<Fragment>> = BTreeMap::new();
        for fragment in &plan.fragments {
            by_source
                .entry(fragment.query.source_id.clone())
                .or_default()
                .push(fragment.clone());
        }

        let mut tasks = JoinSet::new();
        for (source_id, fragments) in by_source {
            let driver = self
                .registry
                .driver(&source_id)
                .await
                .map_err(|e| AppError::PartialExecution {
                    source_id: source_id.clone(),
                    message: e.to_string(),
                })?;
            let fetch_timeout = self.timeout;

            tasks.spawn(async move {
                let mut fetched = Vec::with_capacity(fragments.len());
                for fragment in fragments {
                    tracing::debug!("Fragment {} on '{}': {}", fragment.id, source_id, fragment.query.sql);
                    let result = fetch(driver.as_ref(), &source_id, &fragment.query.sql, fetch_timeout).await;
                    match result {
                        Ok(rows) => fetched.push((fragment.id, rows)),
                        Err(e) => return Err((source_id, e.to_string())),
                    }
                }
                Ok(fetched)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(fetched)) => {
                    for (id, rows) in fetched {
                        tracing::info!("Fragment {} returned {} rows", id, rows.len());
                        results.insert(id, rows);
                    }
                }
                Ok(Err((source_id, message))) => {
                    tasks.abort_all();
                    tracing::error!("Fragment fetch on '{}' failed: {}", source_id, message);
                    return Err(AppError::PartialExecution { source_id, message });
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(AppError::Internal(format!("Fragment task failed: {}", e)));
                }
            }
        }

        Ok(results)
    }

    async fn execute_federated(&self, plan: &FederatedPlan, tenant_row_limit: i64) -> Result<TabularResult, AppError> {
        let start = Instant::now();
        let mut fetched = self.fetch_fragments(plan).await?;

        let mut take = |id: usize| {
            fetched
                .remove(&id)
                .ok_or_else(|| AppError::Internal(format!("Fragment {} produced no result", id)))
        };

        let mut merged = take(plan.root_fragment)?;
        for step in &plan.merge_steps {
            let rows = take(step.fragment)?;
            let (before, incoming) = (merged.len(), rows.len());
            merged = hash_join(merged, rows, step.join_type, &step.keys);
            tracing::info!(
                "Merged fragment {} ({} {} {} rows) into {} rows",
                step.fragment,
                before,
                step.join_type.as_str(),
                incoming,
                merged.len()
            );
        }

        let filtered = apply_filters(&plan.filters, merged);
        let mut projected = if plan.is_grouped() {
            group(plan, filtered)
        } else {
            filtered
                .into_iter()
                .map(|row| Projected {
                    output: project(plan, std::slice::from_ref(&row)),
                    source: row,
                })
                .collect()
        };

        sort(plan, &mut projected);

        let mut rows: Vec<Row> = projected
            .into_iter()
            .skip(plan.offset.max(0) as usize)
            .take(if plan.limit < 0 { usize::MAX } else { plan.limit as usize })
            .map(|p| p.output)
            .collect();
        let truncated = apply_row_limit(&mut rows, tenant_row_limit);

        tracing::info!(
            "Federated query over {} sources returned {} rows{}",
            plan.source_ids().len(),
            rows.len(),
            if truncated { " (truncated by tenant limit)" } else { "" }
        );

        Ok(TabularResult::new(
            plan.columns.clone(),
            rows,
            truncated,
            true,
            start.elapsed().as_millis(),
        ))
    }
}

/// Run one native query under the fetch timeout
async fn fetch(driver: &dyn SourceDriver, source_id: &str, sql: &str, limit: Duration) -> Result<Vec<Row>, AppError> {
    let result = timeout(limit, driver.query(source_id, sql))
        .await
        .map_err(|_| AppError::Connection(format!("Query timed out after {} seconds", limit.as_secs_f64())))??;

    result
        .rows
        .into_iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map),
            other => Err(AppError::Database(format!("Driver returned a non-object row: {}", other))),
        })
        .collect()
}

/// Output row for one group of merged rows (a single row when ungrouped)
fn project(plan: &FederatedPlan, rows: &[Row]) -> Row {
    plan.outputs
        .iter()
        .map(|output| {
            let value = match &output.source {
                OutputSource::Key { key } => rows.first().and_then(|r| r.get(key)).cloned().unwrap_or(Value::Null),
                OutputSource::Expr { expr } => evaluate_group(expr, rows),
            };
            (output.name.clone(), value)
        })
        .collect()
}

/// Group by the declared keys plus every non-aggregate output, in first-seen
/// order
fn group(plan: &FederatedPlan, rows: Vec<Row>) -> Vec<Projected> {
    let group_key = |row: &Row| -> Vec<Option<String>> {
        let declared = plan.group_by.iter().map(|key| row.get(key).and_then(canonical_key));
        let implicit = plan.outputs.iter().filter_map(|output| match &output.source {
            OutputSource::Key { key } => Some(row.get(key).and_then(canonical_key)),
            OutputSource::Expr { expr } if !expr.is_aggregate() => Some(canonical_key(&evaluate(expr, row))),
            OutputSource::Expr { .. } => None,
        });
        declared.chain(implicit).collect()
    };

    let mut groups: Vec<Vec<Row>> = Vec::new();
    let mut index: HashMap<Vec<Option<String>>, usize> = HashMap::new();
    for row in rows {
        let next = groups.len();
        let idx = *index.entry(group_key(&row)).or_insert(next);
        if idx == next {
            groups.push(Vec::new());
        }
        groups[idx].push(row);
    }

    // An aggregate over no rows still yields one row
    if groups.is_empty() && plan.group_by.is_empty() {
        let all_aggregate = plan.outputs.iter().all(|o| match &o.source {
            OutputSource::Expr { expr } => expr.is_aggregate(),
            OutputSource::Key { .. } => false,
        });
        if all_aggregate {
            groups.push(Vec::new());
        }
    }

    groups
        .into_iter()
        .map(|rows| Projected {
            output: project(plan, &rows),
            source: rows.into_iter().next().unwrap_or_default(),
        })
        .collect()
}

/// Stable sort on the declared order; NULLs last ascending, first descending
fn sort(plan: &FederatedPlan, rows: &mut [Projected]) {
    if plan.order_by.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for key in &plan.order_by {
            let (x, y) = match &key.target {
                SortTarget::Raw { key } => (a.source.get(key), b.source.get(key)),
                SortTarget::Output { name } => (a.output.get(name), b.output.get(name)),
            };
            let ordering = compare_values(x.unwrap_or(&Value::Null), y.unwrap_or(&Value::Null));
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}
