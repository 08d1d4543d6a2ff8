//! In-memory table model for array-of-records JSON payloads.
//!
//! A payload like `[{"name":"x","value":10},{"name":"y","value":20}]` parses
//! into ordered rows of named scalar cells. The column set is the union of
//! all record keys in first-seen order; records with differing key sets
//! produce sparse rows, and missing cells are omitted again on
//! serialization so round-trips are exact.

use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// A single typed cell value.
///
/// JSON's dynamic scalar typing carried as an explicit tagged variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    fn into_value(self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Number(n) => Value::Number(n),
            Scalar::String(s) => Value::String(s),
        }
    }
}

/// One row: column name to cell value. Absent keys are sparse cells.
pub type Row = HashMap<String, Scalar>;

/// Ordered rows of named scalar columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Table construction errors
#[derive(Debug)]
pub enum TableError {
    /// Payload is not valid JSON
    Malformed(serde_json::Error),
    /// Top-level JSON value is not an array
    NotAnArray,
    /// An array element is not an object
    RowNotAnObject { row: usize },
    /// A cell holds a nested array or object
    NonScalarCell { row: usize, column: String },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::Malformed(e) => write!(f, "Payload is not valid JSON: {}", e),
            TableError::NotAnArray => write!(f, "Top-level JSON value must be an array of records"),
            TableError::RowNotAnObject { row } => {
                write!(f, "Record {} is not a JSON object", row)
            }
            TableError::NonScalarCell { row, column } => {
                write!(f, "Record {} column '{}' is not a scalar value", row, column)
            }
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TableError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl Table {
    /// Parse array-of-records JSON text into a table.
    pub fn from_json(text: &str) -> Result<Self, TableError> {
        let value: Value = serde_json::from_str(text).map_err(TableError::Malformed)?;

        let Value::Array(records) = value else {
            return Err(TableError::NotAnArray);
        };

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(records.len());

        for (idx, record) in records.into_iter().enumerate() {
            let Value::Object(fields) = record else {
                return Err(TableError::RowNotAnObject { row: idx });
            };

            let mut row = Row::with_capacity(fields.len());
            for (name, cell) in fields {
                let scalar = match cell {
                    Value::Null => Scalar::Null,
                    Value::Bool(b) => Scalar::Bool(b),
                    Value::Number(n) => Scalar::Number(n),
                    Value::String(s) => Scalar::String(s),
                    Value::Array(_) | Value::Object(_) => {
                        return Err(TableError::NonScalarCell {
                            row: idx,
                            column: name,
                        });
                    }
                };

                if !columns.iter().any(|c| c == &name) {
                    columns.push(name.clone());
                }
                row.insert(name, scalar);
            }
            rows.push(row);
        }

        Ok(Table { columns, rows })
    }

    /// Serialize back to array-of-records JSON text.
    ///
    /// Cells are emitted in column (first-seen) order; sparse cells are
    /// omitted from their record.
    pub fn to_json(&self) -> String {
        let records: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut fields = Map::with_capacity(row.len());
                for column in &self.columns {
                    if let Some(cell) = row.get(column) {
                        fields.insert(column.clone(), cell.clone().into_value());
                    }
                }
                Value::Object(fields)
            })
            .collect();

        Value::Array(records).to_string()
    }

    /// Column names in first-seen order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in payload order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decompose into columns and rows, for processors that rebuild the
    /// table after transforming it.
    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }

    /// Reassemble a table from columns and rows.
    pub fn from_parts(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Table { columns, rows }
    }
}
