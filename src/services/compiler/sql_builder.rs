// SELECT statement builder
//
// Renders expression trees, filters and join clauses into one native SELECT.
// Nothing here resolves metadata; callers hand in validated parts.

use serde_json::Value;

use crate::models::{Expr, FilterOperator, JoinLogic, JoinPredicate, JoinType, WhereClause};
use crate::services::compiler::dialect::SqlDialect;

/// Render an expression tree. Binary nodes are parenthesized, so the output
/// is balanced by construction.
pub fn render_expr(expr: &Expr, dialect: SqlDialect) -> String {
    match expr {
        Expr::Column { table_alias, column } => dialect.qualified_column(table_alias, column),
        Expr::Literal { value } => dialect.literal(value),
        Expr::Function { function, args } => {
            let args: Vec<String> = args.iter().map(|a| render_expr(a, dialect)).collect();
            format!("{}({})", function.sql_name(), args.join(", "))
        }
        Expr::Binary { op, left, right } => format!(
            "({} {} {})",
            render_expr(left, dialect),
            op.symbol(),
            render_expr(right, dialect)
        ),
        Expr::Aggregate { function, arg, distinct } => format!(
            "{}({}{})",
            function.sql_name(),
            if *distinct { "DISTINCT " } else { "" },
            render_expr(arg, dialect)
        ),
    }
}

pub fn render_filter(clause: &WhereClause, dialect: SqlDialect) -> String {
    let column = dialect.qualified_column(&clause.column.table_alias, &clause.column.column);
    let value = &clause.value;

    match clause.operator {
        FilterOperator::IsNull => format!("{} IS NULL", column),
        FilterOperator::IsNotNull => format!("{} IS NOT NULL", column),
        FilterOperator::In => {
            let items: Vec<String> = match value {
                Value::Array(items) => items.iter().map(|v| dialect.literal(v)).collect(),
                single => vec![dialect.literal(single)],
            };
            if items.is_empty() {
                // An empty IN list matches nothing
                "1 = 0".to_string()
            } else {
                format!("{} IN ({})", column, items.join(", "))
            }
        }
        FilterOperator::Like => format!("{} LIKE {}", column, dialect.literal(value)),
        op => {
            let symbol = match op {
                FilterOperator::Eq => "=",
                FilterOperator::NotEq => "<>",
                FilterOperator::Gt => ">",
                FilterOperator::GtEq => ">=",
                FilterOperator::Lt => "<",
                _ => "<=",
            };
            format!("{} {} {}", column, symbol, dialect.literal(value))
        }
    }
}

/// Chain clauses with their connectives. SQL precedence (AND binds tighter
/// than OR) is what the in-memory evaluator implements as well.
pub fn render_where(clauses: &[&WhereClause], dialect: SqlDialect) -> Option<String> {
    let mut out = String::new();
    for (idx, clause) in clauses.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
            out.push_str(clause.connective.sql_keyword());
            out.push(' ');
        }
        out.push_str(&render_filter(clause, dialect));
    }
    (!out.is_empty()).then_some(out)
}

/// Render the predicates of one join condition, chained by its connective
pub fn render_join_predicates(predicates: &[JoinPredicate], logic: JoinLogic, dialect: SqlDialect) -> String {
    let rendered: Vec<String> = predicates
        .iter()
        .map(|p| {
            format!(
                "{} {} {}",
                dialect.qualified_column(p.left.alias(), &p.left.column),
                p.operator.symbol(),
                dialect.qualified_column(p.right.alias(), &p.right.column)
            )
        })
        .collect();

    if rendered.len() == 1 {
        rendered.into_iter().next().unwrap_or_default()
    } else {
        format!("({})", rendered.join(&format!(" {} ", logic.sql_keyword())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSource {
    pub schema: String,
    pub table: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableSource,
    /// Rendered conditions, combined with AND
    pub on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// (expression, output alias)
    pub projections: Vec<(String, String)>,
    pub from: TableSource,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

impl SelectStatement {
    pub fn new(from: TableSource) -> Self {
        Self {
            projections: Vec::new(),
            from,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: -1,
            offset: -1,
        }
    }

    /// Add a condition to the WHERE clause, keeping existing ones intact
    pub fn and_where(&mut self, condition: String) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => format!("({}) AND ({})", existing, condition),
            None => condition,
        });
    }

    fn render_source(source: &TableSource, dialect: SqlDialect) -> String {
        format!(
            "{} AS {}",
            dialect.qualified_table(&source.schema, &source.table),
            dialect.quote_ident(&source.alias)
        )
    }

    pub fn render(&self, dialect: SqlDialect) -> String {
        let projections: Vec<String> = self
            .projections
            .iter()
            .map(|(expr, alias)| format!("{} AS {}", expr, dialect.quote_ident(alias)))
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}",
            projections.join(", "),
            Self::render_source(&self.from, dialect)
        );

        for join in &self.joins {
            sql.push_str(&format!(
                " {} {} ON {}",
                join.join_type.sql_keyword(),
                Self::render_source(&join.table, dialect),
                join.on.join(" AND ")
            ));
        }
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(&format!(" WHERE {}", where_clause));
        }
        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(paging) = dialect.paging(self.limit, self.offset) {
            sql.push(' ');
            sql.push_str(&paging);
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateFunction, ArithmeticOp, ColumnRef, ScalarFunction};
    use serde_json::json;

    #[test]
    fn test_render_nested_expression() {
        let expr = Expr::Function {
            function: ScalarFunction::Round,
            args: vec![
                Expr::Aggregate {
                    function: AggregateFunction::Avg,
                    arg: Box::new(Expr::binary(
                        ArithmeticOp::Multiply,
                        Expr::column("o", "qty"),
                        Expr::column("o", "price"),
                    )),
                    distinct: false,
                },
                Expr::literal(json!(2)),
            ],
        };
        assert_eq!(
            render_expr(&expr, SqlDialect::Postgres),
            "ROUND(AVG((\"o\".\"qty\" * \"o\".\"price\")), 2)"
        );
        assert_eq!(
            render_expr(&expr, SqlDialect::MySql),
            "ROUND(AVG((`o`.`qty` * `o`.`price`)), 2)"
        );
    }

    #[test]
    fn test_render_filters() {
        let clause = |op, value| WhereClause {
            column: ColumnRef::new("c", "name"),
            operator: op,
            value,
            connective: JoinLogic::And,
        };
        assert_eq!(
            render_filter(&clause(FilterOperator::Eq, json!("O'Neil")), SqlDialect::Postgres),
            "\"c\".\"name\" = 'O''Neil'"
        );
        assert_eq!(
            render_filter(&clause(FilterOperator::In, json!([1, 2])), SqlDialect::Postgres),
            "\"c\".\"name\" IN (1, 2)"
        );
        assert_eq!(render_filter(&clause(FilterOperator::In, json!([])), SqlDialect::Postgres), "1 = 0");
        assert_eq!(
            render_filter(&clause(FilterOperator::IsNull, Value::Null), SqlDialect::MySql),
            "`c`.`name` IS NULL"
        );
    }

    #[test]
    fn test_statement_without_paging() {
        let mut stmt = SelectStatement::new(TableSource {
            schema: "public".into(),
            table: "customers".into(),
            alias: "c".into(),
        });
        stmt.projections.push(("\"c\".\"id\"".into(), "c.id".into()));
        assert_eq!(
            stmt.render(SqlDialect::Postgres),
            "SELECT \"c\".\"id\" AS \"c.id\" FROM \"public\".\"customers\" AS \"c\""
        );
    }
}
