// Query Operators Module
//
// This module defines the operators used for query execution in the
// iterator-based execution model.

pub mod values;
pub mod sort;
pub mod agg;

pub use values::create_values;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::query::executor::result::{Row, QueryResult, QueryError};

/// The Operator trait defines the interface for all query execution operators
/// in the iterator-based execution model. Each operator processes tuples and
/// passes them to the next operator in the execution plan.
pub trait Operator: Send + Sync {
    /// Initialize the operator before execution
    fn init(&mut self) -> QueryResult<()>;

    /// Get the next row of data from this operator
    fn next(&mut self) -> QueryResult<Option<Row>>;

    /// Close the operator and release any resources
    fn close(&mut self) -> QueryResult<()>;
}

/// Lock a shared operator, reporting a poisoned lock as an execution error.
pub fn lock_operator(op: &Arc<Mutex<dyn Operator>>) -> QueryResult<MutexGuard<'_, dyn Operator + 'static>> {
    op.lock()
        .map_err(|_| QueryError::ExecutionError("Input operator lock poisoned".to_string()))
}

/// Drain an operator into a vector, running its full init/next/close cycle.
pub fn collect_rows(op: &Arc<Mutex<dyn Operator>>) -> QueryResult<Vec<Row>> {
    let mut guard = lock_operator(op)?;
    guard.init()?;
    let mut rows = Vec::new();
    while let Some(row) = guard.next()? {
        rows.push(row);
    }
    guard.close()?;
    Ok(rows)
}
