// Sort-based Aggregation Operator
//
// This operator aggregates input that already arrives ordered by the
// group-by keys. Each group is finished as soon as a row with a different
// key shows up, so only one group's buffer is held at a time.

use std::sync::{Arc, Mutex};

use log::debug;

use super::Aggregation;
use super::hash::GroupKey;
use crate::query::executor::context::Session;
use crate::query::executor::operators::{Operator, lock_operator};
use crate::query::executor::result::{QueryResult, Row};

/// Streaming aggregation over input sorted by the group-by keys
pub struct SortAggregateOperator<A: Aggregation> {
    // Input operator
    input: Arc<Mutex<dyn Operator>>,
    // Group by column references
    group_by_columns: Vec<String>,
    // Aggregate function applied to every group
    aggregation: Arc<A>,
    // Name of the aggregate column in the output rows
    output_column: String,
    session: Arc<Session>,
    // Has this operator been initialized
    initialized: bool,
    // First row of the next group, read while closing the previous one
    pending_row: Option<Row>,
    // Whether all input has been processed
    input_exhausted: bool,
    groups_emitted: usize,
}

impl<A: Aggregation> SortAggregateOperator<A> {
    /// Create a new SortAggregateOperator
    pub fn new(
        input: Arc<Mutex<dyn Operator>>,
        group_by_columns: Vec<String>,
        aggregation: Arc<A>,
        output_column: impl Into<String>,
        session: Arc<Session>,
    ) -> Self {
        SortAggregateOperator {
            input,
            group_by_columns,
            aggregation,
            output_column: output_column.into(),
            session,
            initialized: false,
            pending_row: None,
            input_exhausted: false,
            groups_emitted: 0,
        }
    }

    /// Consume the input up to the end of the next group and evaluate it
    fn next_group(&mut self) -> QueryResult<Option<Row>> {
        let mut input = lock_operator(&self.input)?;

        let first_row = match self.pending_row.take() {
            Some(row) => row,
            None => match input.next()? {
                Some(row) => row,
                None => {
                    self.input_exhausted = true;
                    return Ok(None);
                }
            },
        };

        let ctx = self.session.context()?;
        let group_key = GroupKey::from_row(&first_row, &self.group_by_columns)?;
        let mut buffer = self.aggregation.new_buffer();
        self.aggregation.update(&ctx, &mut buffer, &first_row)?;
        let mut group_rows = 1usize;

        // Process rows until we find a row with a different group key
        loop {
            match input.next()? {
                Some(row) => {
                    let next_key = GroupKey::from_row(&row, &self.group_by_columns)?;
                    if next_key == group_key {
                        self.aggregation.update(&ctx, &mut buffer, &row)?;
                        group_rows += 1;
                    } else {
                        self.pending_row = Some(row);
                        break;
                    }
                }
                None => {
                    self.input_exhausted = true;
                    break;
                }
            }
        }
        drop(input);

        debug!("sort aggregate: closing group of {} rows", group_rows);
        let ctx = self.session.context()?;
        let value = self.aggregation.eval(&ctx, buffer)?;
        Ok(Some(group_key.into_row(&self.group_by_columns, &self.output_column, value)))
    }
}

impl<A: Aggregation> Operator for SortAggregateOperator<A> {
    fn init(&mut self) -> QueryResult<()> {
        if self.initialized {
            return Ok(());
        }

        lock_operator(&self.input)?.init()?;

        self.initialized = true;
        self.input_exhausted = false;
        self.pending_row = None;
        self.groups_emitted = 0;

        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        if !self.initialized {
            self.init()?;
        }

        if self.input_exhausted && self.pending_row.is_none() {
            // A global aggregate over empty input still yields one row
            if self.group_by_columns.is_empty() && self.groups_emitted == 0 {
                self.groups_emitted += 1;
                let ctx = self.session.context()?;
                let value = self.aggregation.eval(&ctx, self.aggregation.new_buffer())?;
                let mut row = Row::new();
                row.set(self.output_column.clone(), value);
                return Ok(Some(row));
            }
            return Ok(None);
        }

        let row = self.next_group()?;
        if row.is_some() {
            self.groups_emitted += 1;
            return Ok(row);
        }
        // input ended exactly at a group boundary
        self.next()
    }

    fn close(&mut self) -> QueryResult<()> {
        lock_operator(&self.input)?.close()?;

        self.initialized = false;
        self.pending_row = None;
        self.input_exhausted = true;

        Ok(())
    }
}

/// Create a new SortAggregateOperator
pub fn create_sort_aggregate<A: Aggregation + 'static>(
    input: Arc<Mutex<dyn Operator>>,
    group_by_columns: Vec<String>,
    aggregation: Arc<A>,
    output_column: impl Into<String>,
    session: Arc<Session>,
) -> QueryResult<Arc<Mutex<dyn Operator>>> {
    let operator = SortAggregateOperator::new(input, group_by_columns, aggregation, output_column, session);

    Ok(Arc::new(Mutex::new(operator)))
}
