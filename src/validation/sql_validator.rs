use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::api::middleware::AppError;
use crate::models::SourceType;

/// Parses every generated native statement in the dialect of the source it
/// will run on before it leaves the compiler.
pub struct SqlValidator;

impl SqlValidator {
    fn dialect_for(source_type: SourceType) -> Box<dyn Dialect> {
        match source_type {
            SourceType::Postgres => Box::new(PostgreSqlDialect {}),
            SourceType::MySql => Box::new(MySqlDialect {}),
            SourceType::FlatFile | SourceType::Document => Box::new(GenericDialect {}),
        }
    }

    fn parse(sql: &str, source_type: SourceType) -> Result<Vec<Statement>, AppError> {
        let dialect = Self::dialect_for(source_type);
        let mut parser = Parser::new(dialect.as_ref())
            .try_with_sql(sql)
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        parser
            .parse_statements()
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))
    }

    /// Validate a native statement: it must parse in the source dialect and
    /// be exactly one SELECT query
    pub fn validate_native(sql: &str, source_type: SourceType) -> Result<(), AppError> {
        let ast = Self::parse(sql, source_type)?;

        match ast.as_slice() {
            [] => Err(AppError::InvalidSql("Empty SQL query".to_string())),
            [Statement::Query(_)] => Ok(()),
            [_] => Err(AppError::InvalidSql(
                "Only SELECT queries are permitted".to_string(),
            )),
            _ => Err(AppError::InvalidSql(format!(
                "Expected a single statement, found {}",
                ast.len()
            ))),
        }
    }

    /// Whether the statement carries a LIMIT clause
    pub fn has_limit(sql: &str, source_type: SourceType) -> bool {
        match Self::parse(sql, source_type) {
            Ok(ast) => matches!(ast.first(), Some(Statement::Query(query)) if query.limit_clause.is_some()),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_native_per_dialect() {
        assert!(SqlValidator::validate_native(
            "SELECT \"c\".\"id\" AS \"c.id\" FROM \"public\".\"customers\" AS \"c\"",
            SourceType::Postgres
        )
        .is_ok());
        assert!(SqlValidator::validate_native(
            "SELECT `c`.`id` AS `c.id` FROM `shop`.`customers` AS `c` LIMIT 18446744073709551615 OFFSET 5",
            SourceType::MySql
        )
        .is_ok());
        assert!(SqlValidator::validate_native("SELECT 1", SourceType::Document).is_ok());
    }

    #[test]
    fn test_rejects_non_select() {
        assert!(SqlValidator::validate_native("DELETE FROM users", SourceType::Postgres).is_err());
        assert!(SqlValidator::validate_native("SELECT 1; SELECT 2", SourceType::Postgres).is_err());
        assert!(SqlValidator::validate_native("SELEC 1", SourceType::MySql).is_err());
        assert!(SqlValidator::validate_native("", SourceType::Postgres).is_err());
    }

    #[test]
    fn test_limit_detection_with_ast() {
        assert!(!SqlValidator::has_limit("SELECT * FROM table_limit", SourceType::Postgres));
        assert!(!SqlValidator::has_limit("SELECT * FROM users /* LIMIT */", SourceType::Postgres));
        assert!(SqlValidator::has_limit("SELECT * FROM users LIMIT 10 OFFSET 2", SourceType::Postgres));
    }
}
