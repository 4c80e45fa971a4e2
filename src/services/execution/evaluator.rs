// In-memory evaluation over merged rows
//
// Rows are JSON objects keyed by "alias.column" (raw fragment columns) or
// "expr.N" (expressions computed inside a fragment). SQL semantics are kept
// where they matter to callers: NULL never compares equal, AND binds tighter
// than OR and aggregates skip NULL inputs.

use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{
    AggregateFunction, ArithmeticOp, DeferredFilter, Expr, FilterOperator, JoinLogic, Row, ScalarFunction,
};

/// Numeric view of a value; numeric strings count as numbers
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn number_key(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        format!("n:{}", f as i64)
    } else {
        format!("n:{}", f)
    }
}

/// Canonical form of a join key. `None` for NULL, which never matches.
///
/// Numbers compare by value, so `1`, `1.0` and `"1"` share one key.
pub fn canonical_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(format!("b:{}", b)),
        Value::Number(_) => as_number(value).map(number_key),
        Value::String(s) => Some(match as_number(value) {
            Some(f) => number_key(f),
            None => format!("s:{}", s),
        }),
        other => Some(format!("j:{}", other)),
    }
}

/// Total order used by sorting and MIN/MAX. NULL sorts after everything.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => text_of(a).cmp(&text_of(b)),
        },
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn an f64 back into JSON, keeping whole numbers integral
fn number_value(f: f64) -> Value {
    if !f.is_finite() {
        Value::Null
    } else if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        json!(f as i64)
    } else {
        json!(f)
    }
}

fn is_integral(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.is_i64() || n.is_u64())
}

fn arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> Value {
    let (Some(l), Some(r)) = (as_number(left), as_number(right)) else {
        return Value::Null;
    };

    if op != ArithmeticOp::Divide && is_integral(left) && is_integral(right) {
        if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
            let exact = match op {
                ArithmeticOp::Add => l.checked_add(r),
                ArithmeticOp::Subtract => l.checked_sub(r),
                _ => l.checked_mul(r),
            };
            if let Some(v) = exact {
                return json!(v);
            }
        }
    }

    match op {
        ArithmeticOp::Add => json!(l + r),
        ArithmeticOp::Subtract => json!(l - r),
        ArithmeticOp::Multiply => json!(l * r),
        ArithmeticOp::Divide if r == 0.0 => Value::Null,
        ArithmeticOp::Divide => json!(l / r),
    }
}

fn scalar(function: ScalarFunction, args: &[Value]) -> Value {
    let first = args.first().unwrap_or(&Value::Null);

    match function {
        ScalarFunction::Coalesce => args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null),
        // CONCAT skips NULL arguments
        ScalarFunction::Concat => Value::String(args.iter().filter(|v| !v.is_null()).map(text_of).collect()),
        ScalarFunction::NullIf => {
            let second = args.get(1).unwrap_or(&Value::Null);
            if !first.is_null() && !second.is_null() && compare_values(first, second) == Ordering::Equal {
                Value::Null
            } else {
                first.clone()
            }
        }
        _ if first.is_null() => Value::Null,
        ScalarFunction::Upper => Value::String(text_of(first).to_uppercase()),
        ScalarFunction::Lower => Value::String(text_of(first).to_lowercase()),
        ScalarFunction::Trim => Value::String(text_of(first).trim().to_string()),
        ScalarFunction::Length => json!(text_of(first).chars().count()),
        ScalarFunction::Abs => match first {
            Value::Number(n) if n.is_i64() => n.as_i64().map(|v| json!(v.saturating_abs())).unwrap_or(Value::Null),
            _ => as_number(first).map(|f| json!(f.abs())).unwrap_or(Value::Null),
        },
        ScalarFunction::Round => {
            let digits = args.get(1).and_then(as_number).unwrap_or(0.0) as i32;
            match as_number(first) {
                Some(f) => {
                    let factor = 10f64.powi(digits);
                    let rounded = (f * factor).round() / factor;
                    if digits <= 0 {
                        number_value(rounded)
                    } else {
                        json!(rounded)
                    }
                }
                None => Value::Null,
            }
        }
    }
}

/// Evaluate a scalar expression against one row
pub fn evaluate(expr: &Expr, row: &Row) -> Value {
    match expr {
        Expr::Column { table_alias, column } => row
            .get(&format!("{}.{}", table_alias, column))
            .cloned()
            .unwrap_or(Value::Null),
        Expr::Literal { value } => value.clone(),
        Expr::Function { function, args } => {
            let args: Vec<Value> = args.iter().map(|a| evaluate(a, row)).collect();
            scalar(*function, &args)
        }
        Expr::Binary { op, left, right } => arithmetic(*op, &evaluate(left, row), &evaluate(right, row)),
        // Outside a group an aggregate sees exactly one row
        Expr::Aggregate { .. } => evaluate_group(expr, std::slice::from_ref(row)),
    }
}

fn aggregate(function: AggregateFunction, distinct: bool, values: Vec<Value>) -> Value {
    let mut values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    if distinct {
        let mut seen = HashSet::new();
        values.retain(|v| seen.insert(canonical_key(v)));
    }

    match function {
        AggregateFunction::Count => json!(values.len()),
        AggregateFunction::Sum => {
            if values.is_empty() {
                return Value::Null;
            }
            if values.iter().all(is_integral) {
                let total = values.iter().filter_map(Value::as_i64).try_fold(0i64, |acc, v| acc.checked_add(v));
                if let Some(total) = total {
                    return json!(total);
                }
            }
            json!(values.iter().filter_map(as_number).sum::<f64>())
        }
        AggregateFunction::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(as_number).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                json!(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateFunction::Min => values.into_iter().min_by(compare_values).unwrap_or(Value::Null),
        AggregateFunction::Max => values.into_iter().max_by(compare_values).unwrap_or(Value::Null),
    }
}

/// Evaluate an expression over the rows of one group. Plain column
/// references take the value from the group's first row.
pub fn evaluate_group(expr: &Expr, rows: &[Row]) -> Value {
    match expr {
        Expr::Aggregate { function, arg, distinct } => {
            let values = rows.iter().map(|row| evaluate(arg, row)).collect();
            aggregate(*function, *distinct, values)
        }
        Expr::Function { function, args } => {
            let args: Vec<Value> = args.iter().map(|a| evaluate_group(a, rows)).collect();
            scalar(*function, &args)
        }
        Expr::Binary { op, left, right } => {
            arithmetic(*op, &evaluate_group(left, rows), &evaluate_group(right, rows))
        }
        Expr::Column { .. } | Expr::Literal { .. } => match rows.first() {
            Some(row) => evaluate(expr, row),
            None => match expr {
                Expr::Literal { value } => value.clone(),
                _ => Value::Null,
            },
        },
    }
}

/// SQL LIKE with `%` and `_` wildcards
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

pub fn matches_filter(filter: &DeferredFilter, row: &Row) -> bool {
    let value = row.get(&filter.key).unwrap_or(&Value::Null);

    match filter.operator {
        FilterOperator::IsNull => value.is_null(),
        FilterOperator::IsNotNull => !value.is_null(),
        _ if value.is_null() => false,
        FilterOperator::In => {
            let key = canonical_key(value);
            match &filter.value {
                Value::Array(items) => items.iter().any(|item| canonical_key(item) == key),
                single => canonical_key(single) == key,
            }
        }
        FilterOperator::Like => like(&text_of(value), &text_of(&filter.value)),
        op => {
            if filter.value.is_null() {
                return false;
            }
            let ordering = compare_values(value, &filter.value);
            match op {
                FilterOperator::Eq => canonical_key(value) == canonical_key(&filter.value),
                FilterOperator::NotEq => canonical_key(value) != canonical_key(&filter.value),
                FilterOperator::Gt => ordering == Ordering::Greater,
                FilterOperator::GtEq => ordering != Ordering::Less,
                FilterOperator::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
    }
}

/// Keep rows passing the filter chain. The chain is split on OR into runs of
/// AND-ed filters; a row passes when any run passes entirely.
pub fn apply_filters(filters: &[DeferredFilter], rows: Vec<Row>) -> Vec<Row> {
    if filters.is_empty() {
        return rows;
    }

    let mut runs: Vec<Vec<&DeferredFilter>> = vec![Vec::new()];
    for (idx, filter) in filters.iter().enumerate() {
        if idx > 0 && filter.connective == JoinLogic::Or {
            runs.push(Vec::new());
        }
        if let Some(run) = runs.last_mut() {
            run.push(filter);
        }
    }

    rows.into_iter()
        .filter(|row| runs.iter().any(|run| run.iter().all(|f| matches_filter(f, row))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row fixture must be an object"),
        }
    }

    fn filter(key: &str, operator: FilterOperator, value: Value, connective: JoinLogic) -> DeferredFilter {
        DeferredFilter {
            key: key.to_string(),
            operator,
            value,
            connective,
        }
    }

    #[test]
    fn test_canonical_keys() {
        assert_eq!(canonical_key(&json!(1)), canonical_key(&json!(1.0)));
        assert_eq!(canonical_key(&json!(1)), canonical_key(&json!("1")));
        assert_ne!(canonical_key(&json!("1a")), canonical_key(&json!(1)));
        assert_ne!(canonical_key(&json!(true)), canonical_key(&json!("true")));
        assert_eq!(canonical_key(&Value::Null), None);
    }

    #[test]
    fn test_nulls_sort_last() {
        let mut values = vec![json!(3), Value::Null, json!(1.5), json!("2")];
        values.sort_by(compare_values);
        assert_eq!(values, vec![json!(1.5), json!("2"), json!(3), Value::Null]);
    }

    #[test]
    fn test_scalar_expressions() {
        let r = row(json!({"c.name": "  ada ", "o.total": 10, "o.tax": 2.5, "o.note": null}));
        let trimmed_upper = Expr::Function {
            function: ScalarFunction::Upper,
            args: vec![Expr::Function {
                function: ScalarFunction::Trim,
                args: vec![Expr::column("c", "name")],
            }],
        };
        assert_eq!(evaluate(&trimmed_upper, &r), json!("ADA"));

        let sum = Expr::binary(ArithmeticOp::Add, Expr::column("o", "total"), Expr::column("o", "tax"));
        assert_eq!(evaluate(&sum, &r), json!(12.5));

        let doubled = Expr::binary(ArithmeticOp::Multiply, Expr::column("o", "total"), Expr::literal(json!(2)));
        assert_eq!(evaluate(&doubled, &r), json!(20));

        let by_zero = Expr::binary(ArithmeticOp::Divide, Expr::column("o", "total"), Expr::literal(json!(0)));
        assert_eq!(evaluate(&by_zero, &r), Value::Null);

        let fallback = Expr::Function {
            function: ScalarFunction::Coalesce,
            args: vec![Expr::column("o", "note"), Expr::literal(json!("none"))],
        };
        assert_eq!(evaluate(&fallback, &r), json!("none"));

        let missing = Expr::Function {
            function: ScalarFunction::Length,
            args: vec![Expr::column("x", "gone")],
        };
        assert_eq!(evaluate(&missing, &r), Value::Null);
    }

    #[test]
    fn test_aggregates_skip_nulls() {
        let rows = vec![
            row(json!({"o.total": 10})),
            row(json!({"o.total": null})),
            row(json!({"o.total": 5})),
            row(json!({"o.total": 10})),
        ];
        let agg = |function, distinct| Expr::Aggregate {
            function,
            arg: Box::new(Expr::column("o", "total")),
            distinct,
        };

        assert_eq!(evaluate_group(&agg(AggregateFunction::Sum, false), &rows), json!(25));
        assert_eq!(evaluate_group(&agg(AggregateFunction::Count, false), &rows), json!(3));
        assert_eq!(evaluate_group(&agg(AggregateFunction::Count, true), &rows), json!(2));
        assert_eq!(evaluate_group(&agg(AggregateFunction::Min, false), &rows), json!(5));
        assert_eq!(evaluate_group(&agg(AggregateFunction::Max, false), &rows), json!(10));
        assert_eq!(evaluate_group(&agg(AggregateFunction::Sum, false), &[]), Value::Null);
        assert_eq!(evaluate_group(&agg(AggregateFunction::Count, false), &[]), json!(0));

        let avg = evaluate_group(&agg(AggregateFunction::Avg, false), &rows);
        assert!((avg.as_f64().unwrap() - 25.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("Linus", "L%"));
        assert!(like("Linus", "%nu%"));
        assert!(like("Ada", "A_a"));
        assert!(!like("Ada", "A_"));
        assert!(like("", "%"));
        assert!(!like("Grace", "%x%"));
    }

    #[test]
    fn test_filter_precedence() {
        let rows = vec![
            row(json!({"c.country": "UK", "o.total": 5})),
            row(json!({"c.country": "UK", "o.total": 50})),
            row(json!({"c.country": "US", "o.total": 5})),
            row(json!({"c.country": null, "o.total": null})),
        ];
        // country = 'US' OR country = 'UK' AND total > 10
        let filters = vec![
            filter("c.country", FilterOperator::Eq, json!("US"), JoinLogic::And),
            filter("c.country", FilterOperator::Eq, json!("UK"), JoinLogic::Or),
            filter("o.total", FilterOperator::Gt, json!(10), JoinLogic::And),
        ];
        let kept = apply_filters(&filters, rows.clone());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0]["o.total"], json!(50));
        assert_eq!(kept[1]["c.country"], json!("US"));

        let nulls = apply_filters(
            &[filter("c.country", FilterOperator::IsNull, Value::Null, JoinLogic::And)],
            rows.clone(),
        );
        assert_eq!(nulls.len(), 1);

        let not_uk = apply_filters(
            &[filter("c.country", FilterOperator::NotEq, json!("UK"), JoinLogic::And)],
            rows,
        );
        assert_eq!(not_uk.len(), 1);
    }

    #[test]
    fn test_in_filter_uses_canonical_values() {
        let r = row(json!({"o.customer_id": "2"}));
        let f = filter("o.customer_id", FilterOperator::In, json!([1, 2]), JoinLogic::And);
        assert!(matches_filter(&f, &r));
        let miss = filter("o.customer_id", FilterOperator::In, json!([]), JoinLogic::And);
        assert!(!matches_filter(&miss, &r));
    }
}
