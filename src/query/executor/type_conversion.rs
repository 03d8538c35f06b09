// Type Conversion Utilities for the Execution Engine
//
// This module provides the conversion of arbitrary values to long text.

use crate::query::executor::result::{QueryResult, QueryError, DataValue};

/// Outcome of a successful text conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextConversion {
    Text(String),
    Null,
}

impl TextConversion {
    pub fn into_option(self) -> Option<String> {
        match self {
            TextConversion::Text(s) => Some(s),
            TextConversion::Null => None,
        }
    }
}

/// Converts values to their textual representation.
pub trait TextConverter: Send + Sync {
    fn to_long_text(&self, value: &DataValue) -> QueryResult<TextConversion>;
}

/// Unbounded-width text conversion
#[derive(Debug, Default, Clone, Copy)]
pub struct LongTextConverter;

impl TextConverter for LongTextConverter {
    fn to_long_text(&self, value: &DataValue) -> QueryResult<TextConversion> {
        let text = match value {
            DataValue::Null => return Ok(TextConversion::Null),
            DataValue::Integer(i) => i.to_string(),
            DataValue::Float(f) if !f.is_finite() => {
                return Err(QueryError::TypeError(format!("Cannot convert non-finite float {} to text", f)));
            }
            DataValue::Float(f) => f.to_string(),
            DataValue::Text(s) => s.clone(),
            DataValue::Boolean(b) => b.to_string(),
            DataValue::Date(s) => s.clone(),
            DataValue::Timestamp(s) => s.clone(),
            DataValue::Blob(b) => hex::encode(b),
        };
        Ok(TextConversion::Text(text))
    }
}
