// Expression tree for derived columns.
//
// Column transforms and calculated columns are trees of nodes rather than
// strings with a tracked closing-parenthesis count, so every renderer emits
// balanced output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::metadata::DataType;

/// A column reference qualified by the table alias used in the query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table_alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }

    /// Key under which a federated fragment returns this column
    pub fn key(&self) -> String {
        format!("{}.{}", self.table_alias, self.column)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScalarFunction {
    Upper,
    Lower,
    Trim,
    Length,
    Abs,
    Round,
    Coalesce,
    Concat,
    NullIf,
}

impl ScalarFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ScalarFunction::Upper => "UPPER",
            ScalarFunction::Lower => "LOWER",
            ScalarFunction::Trim => "TRIM",
            ScalarFunction::Length => "LENGTH",
            ScalarFunction::Abs => "ABS",
            ScalarFunction::Round => "ROUND",
            ScalarFunction::Coalesce => "COALESCE",
            ScalarFunction::Concat => "CONCAT",
            ScalarFunction::NullIf => "NULLIF",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Column {
        table_alias: String,
        column: String,
    },
    Literal {
        value: Value,
    },
    Function {
        function: ScalarFunction,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Binary {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Aggregate {
        function: AggregateFunction,
        arg: Box<Expr>,
        #[serde(default)]
        distinct: bool,
    },
}

impl Expr {
    pub fn column(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal { value }
    }

    pub fn binary(op: ArithmeticOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Every column referenced anywhere in the tree, in first-seen order
    pub fn referenced_columns(&self) -> Vec<ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<ColumnRef>) {
        match self {
            Expr::Column { table_alias, column } => {
                let col = ColumnRef::new(table_alias.clone(), column.clone());
                if !out.contains(&col) {
                    out.push(col);
                }
            }
            Expr::Literal { .. } => {}
            Expr::Function { args, .. } => args.iter().for_each(|a| a.collect_columns(out)),
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Aggregate { arg, .. } => arg.collect_columns(out),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Column { .. } | Expr::Literal { .. } => false,
            Expr::Function { args, .. } => args.iter().any(Expr::is_aggregate),
            Expr::Binary { left, right, .. } => left.is_aggregate() || right.is_aggregate(),
        }
    }

    /// A bare column reference, if the expression is nothing more than that
    pub fn as_column(&self) -> Option<ColumnRef> {
        match self {
            Expr::Column { table_alias, column } => Some(ColumnRef::new(table_alias.clone(), column.clone())),
            _ => None,
        }
    }

    /// Best-effort result type, given a lookup for column types
    pub fn infer_type(&self, lookup: &dyn Fn(&str, &str) -> DataType) -> DataType {
        match self {
            Expr::Column { table_alias, column } => lookup(table_alias, column),
            Expr::Literal { value } => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Integer,
                Value::Number(_) => DataType::Decimal,
                Value::String(_) => DataType::Text,
                Value::Bool(_) => DataType::Boolean,
                Value::Null => DataType::Unknown,
                _ => DataType::Json,
            },
            Expr::Function { function, args } => match function {
                ScalarFunction::Upper
                | ScalarFunction::Lower
                | ScalarFunction::Trim
                | ScalarFunction::Concat => DataType::Text,
                ScalarFunction::Length => DataType::Integer,
                _ => args
                    .first()
                    .map(|a| a.infer_type(lookup))
                    .unwrap_or(DataType::Unknown),
            },
            Expr::Binary { op, left, right } => {
                let (l, r) = (left.infer_type(lookup), right.infer_type(lookup));
                if *op != ArithmeticOp::Divide && l == DataType::Integer && r == DataType::Integer {
                    DataType::Integer
                } else {
                    DataType::Decimal
                }
            }
            Expr::Aggregate { function, arg, .. } => match function {
                AggregateFunction::Count => DataType::Integer,
                AggregateFunction::Avg => DataType::Decimal,
                _ => arg.infer_type(lookup),
            },
        }
    }
}

/// Function applied by one transform node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WrapFunction {
    Scalar(ScalarFunction),
    Aggregate(AggregateFunction),
}

/// One transform node: the wrapped expression becomes the first argument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wrap {
    pub function: WrapFunction,
    /// Extra arguments after the wrapped expression (e.g. ROUND precision)
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub distinct: bool,
}

impl Wrap {
    pub fn new(function: WrapFunction) -> Self {
        Self {
            function,
            args: Vec::new(),
            distinct: false,
        }
    }

    pub fn with_args(mut self, args: Vec<Expr>) -> Self {
        self.args = args;
        self
    }

    pub fn apply(&self, inner: Expr) -> Expr {
        match self.function {
            WrapFunction::Scalar(function) => {
                let mut args = Vec::with_capacity(self.args.len() + 1);
                args.push(inner);
                args.extend(self.args.iter().cloned());
                Expr::Function { function, args }
            }
            WrapFunction::Aggregate(function) => Expr::Aggregate {
                function,
                arg: Box::new(inner),
                distinct: self.distinct,
            },
        }
    }
}
