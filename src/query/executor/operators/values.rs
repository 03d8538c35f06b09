// In-memory Row Source
//
// Feeds a fixed list of rows into an operator pipeline.

use std::sync::{Arc, Mutex};

use crate::query::executor::operators::Operator;
use crate::query::executor::result::{Row, QueryResult, QueryError};

pub struct ValuesOperator {
    rows: Vec<Row>,
    cursor: usize,
    initialized: bool,
}

impl ValuesOperator {
    pub fn new(rows: Vec<Row>) -> Self {
        ValuesOperator {
            rows,
            cursor: 0,
            initialized: false,
        }
    }
}

impl Operator for ValuesOperator {
    fn init(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        if !self.initialized {
            return Err(QueryError::ExecutionError("ValuesOperator not initialized".to_string()));
        }
        match self.rows.get(self.cursor) {
            Some(row) => {
                self.cursor += 1;
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.initialized = false;
        Ok(())
    }
}

pub fn create_values(rows: Vec<Row>) -> QueryResult<Arc<Mutex<dyn Operator>>> {
    Ok(Arc::new(Mutex::new(ValuesOperator::new(rows))))
}
