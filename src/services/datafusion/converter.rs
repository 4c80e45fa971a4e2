// DataFusion ResultConverter
//
// Moves data between JSON documents and Arrow RecordBatches: documents are
// loaded into typed batches before querying, and query results come back as
// JSON objects keyed by column name.

use anyhow::{anyhow, Context, Result};
use datafusion::arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType as ArrowType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::models::{ColumnMetadata, DataType};

pub struct DataFusionResultConverter;

impl DataFusionResultConverter {
    /// Arrow type used to hold a column of the given tag
    pub fn arrow_type_for(data_type: DataType) -> ArrowType {
        match data_type {
            DataType::Integer => ArrowType::Int64,
            DataType::Decimal => ArrowType::Float64,
            DataType::Boolean => ArrowType::Boolean,
            _ => ArrowType::Utf8,
        }
    }

    /// Build a RecordBatch from JSON documents using previously derived
    /// column metadata. Values that do not fit the column type become NULL,
    /// except in text columns where they are stringified.
    pub fn documents_to_batch(documents: &[Value], columns: &[ColumnMetadata]) -> Result<RecordBatch> {
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(&c.name, Self::arrow_type_for(c.data_type), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        if columns.is_empty() {
            return Ok(RecordBatch::new_empty(schema));
        }

        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
        for column in columns {
            let values = documents.iter().map(|doc| doc.get(&column.name));
            let array: ArrayRef = match Self::arrow_type_for(column.data_type) {
                ArrowType::Int64 => Arc::new(Int64Array::from(
                    values.map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>(),
                )),
                ArrowType::Float64 => Arc::new(Float64Array::from(
                    values.map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>(),
                )),
                ArrowType::Boolean => Arc::new(BooleanArray::from(
                    values.map(|v| v.and_then(Value::as_bool)).collect::<Vec<_>>(),
                )),
                _ => Arc::new(StringArray::from(
                    values
                        .map(|v| match v {
                            None | Some(Value::Null) => None,
                            Some(Value::String(s)) => Some(s.clone()),
                            Some(other) => Some(other.to_string()),
                        })
                        .collect::<Vec<Option<String>>>(),
                )),
            };
            arrays.push(array);
        }

        RecordBatch::try_new(schema, arrays).context("Failed to create RecordBatch")
    }

    /// Convert RecordBatches into JSON objects keyed by column name
    pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Value>> {
        let mut rows = Vec::new();

        for batch in batches {
            let schema = batch.schema();
            let columns: Vec<Vec<Value>> = batch
                .columns()
                .iter()
                .map(|array| Self::array_to_values(array))
                .collect::<Result<_>>()?;

            for row_idx in 0..batch.num_rows() {
                let mut row = Map::new();
                for (col_idx, field) in schema.fields().iter().enumerate() {
                    row.insert(field.name().clone(), columns[col_idx][row_idx].clone());
                }
                rows.push(Value::Object(row));
            }
        }

        Ok(rows)
    }

    fn array_to_values(array: &ArrayRef) -> Result<Vec<Value>> {
        let target = match array.data_type() {
            ArrowType::Int8
            | ArrowType::Int16
            | ArrowType::Int32
            | ArrowType::Int64
            | ArrowType::UInt8
            | ArrowType::UInt16
            | ArrowType::UInt32 => ArrowType::Int64,
            ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 => ArrowType::Float64,
            ArrowType::Boolean => ArrowType::Boolean,
            ArrowType::Null => return Ok(vec![Value::Null; array.len()]),
            _ => ArrowType::Utf8,
        };

        let converted = cast(array, &target)
            .map_err(|e| anyhow!("Cannot convert {} column to JSON: {}", array.data_type(), e))?;

        let values = match target {
            ArrowType::Int64 => {
                let typed = converted
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or_else(|| anyhow!("Type mismatch converting integer column"))?;
                (0..typed.len())
                    .map(|i| if typed.is_null(i) { Value::Null } else { json!(typed.value(i)) })
                    .collect()
            }
            ArrowType::Float64 => {
                let typed = converted
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| anyhow!("Type mismatch converting float column"))?;
                (0..typed.len())
                    .map(|i| if typed.is_null(i) { Value::Null } else { json!(typed.value(i)) })
                    .collect()
            }
            ArrowType::Boolean => {
                let typed = converted
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or_else(|| anyhow!("Type mismatch converting boolean column"))?;
                (0..typed.len())
                    .map(|i| if typed.is_null(i) { Value::Null } else { json!(typed.value(i)) })
                    .collect()
            }
            _ => {
                let typed = converted
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| anyhow!("Type mismatch converting text column"))?;
                (0..typed.len())
                    .map(|i| if typed.is_null(i) { Value::Null } else { json!(typed.value(i)) })
                    .collect()
            }
        };

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceType, TableMetadata, TableType};

    fn columns() -> Vec<ColumnMetadata> {
        TableMetadata::new("docs", SourceType::Document, "public", "orders", TableType::Collection)
            .with_column("id", DataType::Integer)
            .with_column("total", DataType::Decimal)
            .with_column("note", DataType::Text)
            .columns
    }

    #[test]
    fn test_documents_to_batch() {
        let docs = vec![
            json!({"id": 1, "total": 9.5, "note": "first"}),
            json!({"id": 2, "total": 3, "note": {"nested": true}}),
            json!({"id": 3}),
        ];

        let batch = DataFusionResultConverter::documents_to_batch(&docs, &columns()).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 3);

        let rows = DataFusionResultConverter::batches_to_rows(&[batch]).unwrap();
        assert_eq!(rows[0]["note"], json!("first"));
        assert_eq!(rows[1]["total"], json!(3.0));
        assert_eq!(rows[1]["note"], json!("{\"nested\":true}"));
        assert_eq!(rows[2]["total"], Value::Null);
    }

    #[test]
    fn test_empty_documents() {
        let batch = DataFusionResultConverter::documents_to_batch(&[], &columns()).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert!(DataFusionResultConverter::batches_to_rows(&[batch]).unwrap().is_empty());
    }
}
