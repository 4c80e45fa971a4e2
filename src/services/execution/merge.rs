// Hash merge join
//
// Joins the rows merged so far with the rows of one more fragment. The
// smaller input is indexed and the larger one probes it; which side is
// indexed never changes the result set.

use std::collections::HashMap;

use crate::models::{JoinKey, JoinType, Row};
use crate::services::execution::evaluator::canonical_key;

/// Canonical composite key, or `None` when any part is NULL
fn row_key(row: &Row, columns: &[&str]) -> Option<Vec<String>> {
    columns
        .iter()
        .map(|c| row.get(*c).and_then(canonical_key))
        .collect()
}

fn combine(left: &Row, right: &Row) -> Row {
    let mut row = left.clone();
    row.extend(right.iter().map(|(k, v)| (k.clone(), v.clone())));
    row
}

/// `accumulated <join_type> fragment ON keys`
///
/// Unmatched rows of a preserved side are emitted alone; the other side's
/// keys are simply absent, which evaluates to NULL downstream.
pub fn hash_join(accumulated: Vec<Row>, fragment: Vec<Row>, join_type: JoinType, keys: &[JoinKey]) -> Vec<Row> {
    let left_columns: Vec<&str> = keys.iter().map(|k| k.accumulated.as_str()).collect();
    let right_columns: Vec<&str> = keys.iter().map(|k| k.fragment.as_str()).collect();
    let keep_left = matches!(join_type, JoinType::Left | JoinType::Full);
    let keep_right = matches!(join_type, JoinType::Right | JoinType::Full);

    let build_left = accumulated.len() <= fragment.len();
    let (build, probe, build_columns, probe_columns, keep_build, keep_probe) = if build_left {
        (&accumulated, &fragment, &left_columns, &right_columns, keep_left, keep_right)
    } else {
        (&fragment, &accumulated, &right_columns, &left_columns, keep_right, keep_left)
    };

    let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (idx, row) in build.iter().enumerate() {
        if let Some(key) = row_key(row, build_columns) {
            index.entry(key).or_default().push(idx);
        }
    }

    // Output always lists accumulated columns first
    let joined = |build_row: &Row, probe_row: &Row| {
        if build_left {
            combine(build_row, probe_row)
        } else {
            combine(probe_row, build_row)
        }
    };

    let mut matched = vec![false; build.len()];
    let mut out = Vec::new();
    for probe_row in probe {
        let hits = row_key(probe_row, probe_columns).and_then(|key| index.get(&key));
        match hits {
            Some(hits) => {
                for &idx in hits {
                    matched[idx] = true;
                    out.push(joined(&build[idx], probe_row));
                }
            }
            None if keep_probe => out.push(probe_row.clone()),
            None => {}
        }
    }

    if keep_build {
        out.extend(
            build
                .iter()
                .zip(&matched)
                .filter(|(_, hit)| !**hit)
                .map(|(row, _)| row.clone()),
        );
    }

    out
}
