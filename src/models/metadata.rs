// Normalized schema metadata shared by every source type.
//
// Relational catalogs, document collections and flat files are all reduced to
// TableMetadata / ColumnMetadata so the compiler and the join candidate
// generator never see a native catalog shape.

use serde::{Deserialize, Serialize};

use crate::models::expression::{Expr, Wrap};

/// Source type enumeration for registered data sources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// PostgreSQL database
    Postgres,
    /// MySQL / MariaDB database
    MySql,
    /// CSV or NDJSON files queried through DataFusion
    FlatFile,
    /// Document collections queried through DataFusion
    Document,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Postgres => "postgres",
            SourceType::MySql => "mysql",
            SourceType::FlatFile => "flat_file",
            SourceType::Document => "document",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SourceType::Postgres),
            "mysql" | "mariadb" => Ok(SourceType::MySql),
            "flat_file" | "csv" | "file" => Ok(SourceType::FlatFile),
            "document" | "json" => Ok(SourceType::Document),
            _ => Err(format!("Unsupported source type: {}", s)),
        }
    }
}

/// Closed set of column type tags every native type is mapped onto
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Integer,
    Decimal,
    Text,
    Boolean,
    Date,
    Timestamp,
    Uuid,
    Json,
    #[default]
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Decimal => "decimal",
            DataType::Text => "text",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::Uuid => "uuid",
            DataType::Json => "json",
            DataType::Unknown => "unknown",
        }
    }

    /// Whether values of the two types can be compared by a join key equality.
    ///
    /// Text is compatible with integer and uuid keys because flat files and
    /// document stores routinely carry identifiers as strings.
    pub fn is_join_compatible(&self, other: &DataType) -> bool {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => *a != Json,
            (Integer, Decimal) | (Decimal, Integer) => true,
            (Text, Integer) | (Integer, Text) => true,
            (Text, Uuid) | (Uuid, Text) => true,
            (Date, Timestamp) | (Timestamp, Date) => true,
            (Unknown, Text) | (Text, Unknown) => true,
            _ => false,
        }
    }
}

/// Kind of relation a TableMetadata describes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    BaseTable,
    View,
    Collection,
    File,
}

impl TableType {
    pub fn from_native(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "VIEW" | "SYSTEM VIEW" | "MATERIALIZED VIEW" => TableType::View,
            _ => TableType::BaseTable,
        }
    }
}

/// Foreign-key descriptor attached to a column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnReference {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub foreign_schema: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    /// Type name as reported by the source, kept for display
    #[serde(default)]
    pub native_type: String,
    #[serde(default)]
    pub max_length: Option<i64>,
    #[serde(default)]
    pub ordinal_position: i32,
    pub table_name: String,
    #[serde(default)]
    pub schema_name: String,
    /// Output alias chosen by the user
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub reference: Option<ColumnReference>,
    #[serde(default)]
    pub data_source_id: String,
    #[serde(default)]
    pub data_source_type: Option<SourceType>,
    #[serde(default)]
    pub table_alias: Option<String>,
    /// Wrap nodes applied inside-out around the raw column
    #[serde(default)]
    pub transform: Vec<Wrap>,
}

impl ColumnMetadata {
    pub fn new(
        table: &TableMetadata,
        name: impl Into<String>,
        data_type: DataType,
        native_type: impl Into<String>,
        ordinal_position: i32,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            native_type: native_type.into(),
            max_length: None,
            ordinal_position,
            table_name: table.table_name.clone(),
            schema_name: table.schema_name.clone(),
            alias: None,
            is_selected: false,
            reference: None,
            data_source_id: table.data_source_id.clone(),
            data_source_type: Some(table.data_source_type),
            table_alias: None,
            transform: Vec::new(),
        }
    }

    /// Alias of the owning table inside a query, falling back to the table name
    pub fn table_ref(&self) -> &str {
        match self.table_alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => &self.table_name,
        }
    }

    /// `table.column` unless an explicit alias is set
    pub fn display_name(&self) -> String {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => format!("{}.{}", self.table_ref(), self.name),
        }
    }

    /// The projected expression: the raw column wrapped by every transform node
    pub fn expression(&self) -> Expr {
        self.transform
            .iter()
            .fold(Expr::column(self.table_ref(), &self.name), |inner, wrap| {
                wrap.apply(inner)
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetadata {
    pub data_source_id: String,
    pub data_source_type: SourceType,
    pub schema_name: String,
    pub table_name: String,
    /// Logical name shown to users when the physical name is generated
    #[serde(default)]
    pub original_name: Option<String>,
    pub table_type: TableType,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn new(
        data_source_id: impl Into<String>,
        data_source_type: SourceType,
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        table_type: TableType,
    ) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            data_source_type,
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            original_name: None,
            table_type,
            columns: Vec::new(),
        }
    }

    /// Append a column, assigning the next ordinal position
    pub fn with_column(mut self, name: &str, data_type: DataType) -> Self {
        let ordinal = self.columns.len() as i32 + 1;
        let column = ColumnMetadata::new(&self, name, data_type, data_type.as_str(), ordinal);
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn qualified_name(&self) -> String {
        if self.schema_name.is_empty() {
            self.table_name.clone()
        } else {
            format!("{}.{}", self.schema_name, self.table_name)
        }
    }

    pub fn matches(&self, data_source_id: &str, schema: &str, table: &str) -> bool {
        self.data_source_id == data_source_id && self.schema_name == schema && self.table_name == table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::expression::{ScalarFunction, WrapFunction};

    fn customers() -> TableMetadata {
        TableMetadata::new("src-a", SourceType::Postgres, "public", "customers", TableType::BaseTable)
            .with_column("id", DataType::Integer)
            .with_column("email", DataType::Text)
    }

    #[test]
    fn test_display_name_defaults_to_table_dot_column() {
        let table = customers();
        let mut column = table.column("email").unwrap().clone();
        assert_eq!(column.display_name(), "customers.email");

        column.table_alias = Some("c".to_string());
        assert_eq!(column.display_name(), "c.email");

        column.alias = Some("Email".to_string());
        assert_eq!(column.display_name(), "Email");
    }

    #[test]
    fn test_expression_applies_wraps_inside_out() {
        let table = customers();
        let mut column = table.column("email").unwrap().clone();
        column.transform = vec![
            Wrap::new(WrapFunction::Scalar(ScalarFunction::Trim)),
            Wrap::new(WrapFunction::Scalar(ScalarFunction::Lower)),
        ];

        match column.expression() {
            Expr::Function { function, args } => {
                assert_eq!(function, ScalarFunction::Lower);
                assert!(matches!(&args[0], Expr::Function { function: ScalarFunction::Trim, .. }));
            }
            other => panic!("unexpected expression {:?}", other),
        }
    }

    #[test]
    fn test_join_compatibility() {
        assert!(DataType::Integer.is_join_compatible(&DataType::Decimal));
        assert!(DataType::Text.is_join_compatible(&DataType::Integer));
        assert!(!DataType::Boolean.is_join_compatible(&DataType::Integer));
        assert!(!DataType::Json.is_join_compatible(&DataType::Json));
    }

    #[test]
    fn test_source_type_parsing() {
        assert_eq!(SourceType::from_str("PostgreSQL").unwrap(), SourceType::Postgres);
        assert_eq!(SourceType::from_str("csv").unwrap(), SourceType::FlatFile);
        assert!(SourceType::from_str("oracle").is_err());
    }
}
