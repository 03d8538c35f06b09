// Query Result Implementation
//
// This module defines the value, row and error types shared by the executor.

use std::collections::HashMap;
use std::fmt;
use std::cmp::{Ordering, Eq};
use std::hash::{Hash, Hasher};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use linked_hash_map::LinkedHashMap;

use crate::query::ast::DataType;

/// Possible data types for values in a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Date(String),
    Timestamp(String),
    Blob(Vec<u8>),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            DataValue::Null => 0.hash(state),
            DataValue::Integer(i) => { 1.hash(state); i.hash(state); }
            DataValue::Float(f) => { 2.hash(state); f.to_bits().hash(state); }
            DataValue::Text(s) => { 3.hash(state); s.hash(state); }
            DataValue::Boolean(b) => { 4.hash(state); b.hash(state); }
            DataValue::Date(s) => { 5.hash(state); s.hash(state); }
            DataValue::Timestamp(s) => { 6.hash(state); s.hash(state); }
            DataValue::Blob(b) => { 7.hash(state); b.hash(state); }
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Date(s) => write!(f, "DATE '{}'", s),
            DataValue::Timestamp(s) => write!(f, "TIMESTAMP '{}'", s),
            DataValue::Blob(b) => write!(f, "BLOB ({} bytes)", b.len()),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Some(Ordering::Equal),
            (DataValue::Null, _) => Some(Ordering::Less),
            (_, DataValue::Null) => Some(Ordering::Greater),

            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => compare_int_float(*a, *b),
            (DataValue::Float(a), DataValue::Integer(b)) => compare_int_float(*b, *a).map(Ordering::reverse),
            (DataValue::Text(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),
            (DataValue::Date(a), DataValue::Date(b)) => Some(a.cmp(b)),
            (DataValue::Timestamp(a), DataValue::Timestamp(b)) => Some(a.cmp(b)),
            // Blobs are not ordered beyond equality
            (DataValue::Blob(_), DataValue::Blob(_)) => None,

            (DataValue::Text(a), DataValue::Date(b)) => Some(a.cmp(b)),
            (DataValue::Date(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Text(a), DataValue::Timestamp(b)) => Some(a.cmp(b)),
            (DataValue::Timestamp(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Date(a), DataValue::Timestamp(b)) => Some(a.as_str().cmp(b.split(' ').next().unwrap_or(""))),
            (DataValue::Timestamp(a), DataValue::Date(b)) => Some(a.split(' ').next().unwrap_or("").cmp(b.as_str())),

            _ => None,
        }
    }
}

/// Exact ordering of an integer against a float; `as f64` rounds above 2^53.
fn compare_int_float(int: i64, float: f64) -> Option<Ordering> {
    // i64 covers [-2^63, 2^63)
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return None;
    }
    if float >= BOUND {
        return Some(Ordering::Less);
    }
    if float < -BOUND {
        return Some(Ordering::Greater);
    }

    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)),
        other => Some(other),
    }
}

impl DataValue {
    pub fn get_type(&self) -> DataType {
        match self {
            DataValue::Null => DataType::Text,
            DataValue::Integer(_) => DataType::Integer,
            DataValue::Float(_) => DataType::Float,
            DataValue::Text(_) => DataType::Text,
            DataValue::Boolean(_) => DataType::Boolean,
            DataValue::Date(_) => DataType::Date,
            DataValue::Timestamp(_) => DataType::Timestamp,
            DataValue::Blob(_) => DataType::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Compare two DataValues for sorting purposes.
    /// NULLs are considered less than any non-NULL value; callers that need a
    /// different placement handle NULLs before delegating here.
    /// Returns Ordering or QueryError for incompatible types.
    pub fn compare(&self, other: &Self) -> QueryResult<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Ok(Ordering::Equal),
            (DataValue::Null, _) => Ok(Ordering::Less),
            (_, DataValue::Null) => Ok(Ordering::Greater),
            (a, b) => a.partial_cmp(b).ok_or_else(||
                QueryError::TypeError(format!("Cannot compare incompatible types: {:?} and {:?}", a.get_type(), b.get_type()))
            )
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a value. Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DataValue::Null,
            serde_json::Value::Bool(b) => DataValue::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DataValue::Integer(i),
                None => DataValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => DataValue::Text(s.clone()),
            other => DataValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataValue::Null => serde_json::Value::Null,
            DataValue::Integer(i) => serde_json::Value::from(*i),
            DataValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DataValue::Text(s) | DataValue::Date(s) | DataValue::Timestamp(s) => serde_json::Value::String(s.clone()),
            DataValue::Boolean(b) => serde_json::Value::Bool(*b),
            DataValue::Blob(b) => serde_json::Value::String(hex::encode(b)),
        }
    }
}

/// Represents a row in query results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    /// Values indexed by column name
    values: HashMap<String, DataValue>,
    /// Column order for consistent display
    column_order: Vec<String>,
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        if self.column_order.len() != other.column_order.len() {
            return false;
        }

        for col in &self.column_order {
            match (self.values.get(col), other.values.get(col)) {
                (Some(v1), Some(v2)) if v1 == v2 => {}
                _ => return false,
            }
        }

        true
    }
}

impl Eq for Row {}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

impl Row {
    /// Create a new empty row
    pub fn new() -> Self {
        Row {
            values: HashMap::new(),
            column_order: Vec::new(),
        }
    }

    /// Create a row from column values
    pub fn from_values(columns: Vec<String>, values: Vec<DataValue>) -> Self {
        let mut row = Row::new();
        for (col, val) in columns.into_iter().zip(values) {
            row.set(col, val);
        }
        row
    }

    /// Create a row from an ordered map, keeping the map's column order
    pub fn from_ordered_map(values: LinkedHashMap<String, DataValue>) -> Self {
        let column_order = values.keys().cloned().collect();
        Row {
            values: values.into_iter().collect(),
            column_order,
        }
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&DataValue> {
        self.values.get(column)
    }

    /// Set a value for a column
    pub fn set(&mut self, column: String, value: DataValue) {
        if !self.column_order.contains(&column) {
            self.column_order.push(column.clone());
        }
        self.values.insert(column, value);
    }

    /// Get all columns in the row
    pub fn columns(&self) -> &[String] {
        &self.column_order
    }

    /// Number of columns in the row
    pub fn width(&self) -> usize {
        self.column_order.len()
    }

    /// Get all values in column order
    pub fn values(&self) -> Vec<&DataValue> {
        self.column_order.iter()
            .filter_map(|col| self.values.get(col))
            .collect()
    }

    /// Copy of the row with the named columns removed
    pub fn without_columns(&self, excluded: &[&str]) -> Row {
        let mut row = Row::new();
        for col in &self.column_order {
            if excluded.contains(&col.as_str()) {
                continue;
            }
            if let Some(value) = self.values.get(col) {
                row.set(col.clone(), value.clone());
            }
        }
        row
    }
}

impl AsRef<Row> for Row {
    fn as_ref(&self) -> &Row {
        self
    }
}

/// Represents query execution error
#[derive(Error, Debug)]
pub enum QueryError {
    /// Error during query execution
    #[error("Execution error: {0}")]
    ExecutionError(String),
    /// Error in data type conversion
    #[error("Type error: {0}")]
    TypeError(String),
    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    /// Invalid configuration of an operator, aggregate or session variable
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// Expression rebuilt with the wrong number of children
    #[error("Invalid children number: {0}")]
    InvalidChildrenNumber(String),
    /// Partial state could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// Numeric overflow
    #[error("Numeric overflow")]
    NumericOverflow,
    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,
}

impl From<bincode::Error> for QueryError {
    fn from(err: bincode::Error) -> Self {
        QueryError::SerializationError(err.to_string())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query resultset representation
#[derive(Debug)]
pub struct QueryResultSet {
    /// Column names in the resultset
    columns: Vec<String>,
    /// Rows of data
    rows: Vec<Row>,
}

impl QueryResultSet {
    /// Create a new empty resultset with column names
    pub fn new(columns: Vec<String>) -> Self {
        QueryResultSet {
            columns,
            rows: Vec::new(),
        }
    }

    /// Add a row to the resultset
    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Get the columns in the resultset
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get the rows in the resultset
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Format the resultset as a string table
    pub fn to_string_table(&self) -> String {
        if self.columns.is_empty() {
            return "Empty result".to_string();
        }

        let mut result = String::new();

        result.push_str("| ");
        for col in &self.columns {
            result.push_str(&format!("{} | ", col));
        }
        result.push('\n');

        result.push('|');
        for col in &self.columns {
            result.push_str(&format!("{}|", "-".repeat(col.len() + 2)));
        }
        result.push('\n');

        for row in &self.rows {
            result.push_str("| ");
            for col in &self.columns {
                match row.get(col) {
                    Some(value) => result.push_str(&format!("{} | ", value)),
                    None => result.push_str("NULL | "),
                }
            }
            result.push('\n');
        }

        result
    }

    /// Format the resultset as one JSON object per line
    pub fn to_json_lines(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let mut object = serde_json::Map::new();
            for col in &self.columns {
                let value = row.get(col).map(DataValue::to_json).unwrap_or(serde_json::Value::Null);
                object.insert(col.clone(), value);
            }
            out.push_str(&serde_json::Value::Object(object).to_string());
            out.push('\n');
        }
        out
    }
}
