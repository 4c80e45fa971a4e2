// SQL dialect rendering
//
// Identifier quoting, literal escaping and paging clauses for the dialects
// native queries are emitted in. Literals are always rendered inline.

use serde_json::Value;

use crate::models::SourceType;

/// MySQL has no OFFSET without LIMIT; this is its documented "all rows" value
const MYSQL_MAX_LIMIT: &str = "18446744073709551615";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    MySql,
    /// ANSI quoting, executed by the embedded DataFusion engine
    Generic,
}

impl SqlDialect {
    pub fn for_source(source_type: SourceType) -> Self {
        match source_type {
            SourceType::Postgres => SqlDialect::Postgres,
            SourceType::MySql => SqlDialect::MySql,
            SourceType::FlatFile | SourceType::Document => SqlDialect::Generic,
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            SqlDialect::MySql => format!("`{}`", ident.replace('`', "``")),
            SqlDialect::Postgres | SqlDialect::Generic => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    pub fn qualified_table(&self, schema: &str, table: &str) -> String {
        if schema.is_empty() {
            self.quote_ident(table)
        } else {
            format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
        }
    }

    pub fn qualified_column(&self, table_alias: &str, column: &str) -> String {
        format!("{}.{}", self.quote_ident(table_alias), self.quote_ident(column))
    }

    pub fn string_literal(&self, s: &str) -> String {
        let escaped = match self {
            // MySQL treats backslash as an escape character inside strings
            SqlDialect::MySql => s.replace('\\', "\\\\").replace('\'', "''"),
            SqlDialect::Postgres | SqlDialect::Generic => s.replace('\'', "''"),
        };
        format!("'{}'", escaped)
    }

    /// Render a JSON value as an inline SQL literal
    pub fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.string_literal(s),
            other => self.string_literal(&other.to_string()),
        }
    }

    /// LIMIT / OFFSET clause; -1 omits the corresponding part
    pub fn paging(&self, limit: i64, offset: i64) -> Option<String> {
        match (limit >= 0, offset >= 0) {
            (false, false) => None,
            (true, false) => Some(format!("LIMIT {}", limit)),
            (true, true) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
            (false, true) => match self {
                SqlDialect::MySql => Some(format!("LIMIT {} OFFSET {}", MYSQL_MAX_LIMIT, offset)),
                SqlDialect::Postgres | SqlDialect::Generic => Some(format!("OFFSET {}", offset)),
            },
        }
    }
}
