use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::query::ast::Expression;
use crate::query::executor::context::{ExecutionContext, Session};
use crate::query::executor::expression_eval::{AstEvaluator, RowEvaluator};
use crate::query::executor::operators::{Operator, lock_operator};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl SortDirection {
    /// NULL sorts as the smallest value unless told otherwise
    pub fn default_null_ordering(self) -> NullOrdering {
        match self {
            SortDirection::Ascending => NullOrdering::NullsFirst,
            SortDirection::Descending => NullOrdering::NullsLast,
        }
    }
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub expr: Expression,
    pub direction: SortDirection,
    pub nulls: NullOrdering,
}

impl SortSpec {
    pub fn new(expr: Expression, direction: SortDirection) -> Self {
        SortSpec { expr, direction, nulls: direction.default_null_ordering() }
    }

    pub fn asc(expr: Expression) -> Self {
        Self::new(expr, SortDirection::Ascending)
    }

    pub fn desc(expr: Expression) -> Self {
        Self::new(expr, SortDirection::Descending)
    }

    pub fn with_nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }

    /// Same direction and null placement, different expression
    pub fn with_expr(&self, expr: Expression) -> Self {
        SortSpec { expr, direction: self.direction, nulls: self.nulls }
    }

    /// Compare two evaluated key values under this key's rules.
    pub fn compare_values(&self, a: &DataValue, b: &DataValue) -> QueryResult<Ordering> {
        let nulls_first = self.nulls == NullOrdering::NullsFirst;
        match (a.is_null(), b.is_null()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(if nulls_first { Ordering::Less } else { Ordering::Greater }),
            (false, true) => Ok(if nulls_first { Ordering::Greater } else { Ordering::Less }),
            (false, false) => {
                let ord = a.compare(b)?;
                Ok(match self.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                })
            }
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        write!(f, "{} {}", self.expr, direction)?;
        if self.nulls != self.direction.default_null_ordering() {
            match self.nulls {
                NullOrdering::NullsFirst => write!(f, " NULLS FIRST")?,
                NullOrdering::NullsLast => write!(f, " NULLS LAST")?,
            }
        }
        Ok(())
    }
}

/// Orders rows by a list of sort keys.
pub trait RowSorter: Send + Sync {
    /// Returns the indices of `rows` in sorted order. Rows whose keys compare
    /// equal keep their relative order. The first evaluation or comparison
    /// failure aborts the sort.
    fn sorted_order(
        &self,
        keys: &[SortSpec],
        rows: &[&Row],
        evaluator: &dyn RowEvaluator,
        ctx: &ExecutionContext,
    ) -> QueryResult<Vec<usize>>;
}

/// Key-materializing stable sort
#[derive(Debug, Default, Clone, Copy)]
pub struct StableSorter;

impl RowSorter for StableSorter {
    fn sorted_order(
        &self,
        keys: &[SortSpec],
        rows: &[&Row],
        evaluator: &dyn RowEvaluator,
        ctx: &ExecutionContext,
    ) -> QueryResult<Vec<usize>> {
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let tuple = keys
                .iter()
                .map(|key| evaluator.evaluate(&key.expr, row, ctx))
                .collect::<QueryResult<Vec<_>>>()?;
            tuples.push(tuple);
        }

        let mut order: Vec<usize> = (0..rows.len()).collect();
        let mut failure: Option<QueryError> = None;
        order.sort_by(|&a, &b| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            for (i, key) in keys.iter().enumerate() {
                match key.compare_values(&tuples[a][i], &tuples[b][i]) {
                    Ok(Ordering::Equal) => continue,
                    Ok(ord) => return ord,
                    Err(e) => {
                        failure = Some(e);
                        return Ordering::Equal;
                    }
                }
            }
            Ordering::Equal
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(order),
        }
    }
}

/// Reorder `rows` in place using the sorter's stable order.
pub fn sort_rows<T: AsRef<Row>>(
    sorter: &dyn RowSorter,
    keys: &[SortSpec],
    rows: &mut Vec<T>,
    evaluator: &dyn RowEvaluator,
    ctx: &ExecutionContext,
) -> QueryResult<()> {
    if keys.is_empty() || rows.len() < 2 {
        return Ok(());
    }

    let order = {
        let refs: Vec<&Row> = rows.iter().map(AsRef::as_ref).collect();
        sorter.sorted_order(keys, &refs, evaluator, ctx)?
    };

    let mut slots: Vec<Option<T>> = rows.drain(..).map(Some).collect();
    for index in order {
        match slots.get_mut(index).and_then(Option::take) {
            Some(row) => rows.push(row),
            None => {
                return Err(QueryError::ExecutionError(format!(
                    "Sorter returned an invalid or repeated row index {}", index
                )));
            }
        }
    }
    if rows.len() != slots.len() {
        return Err(QueryError::ExecutionError(format!(
            "Sorter returned {} of {} rows", rows.len(), slots.len()
        )));
    }
    Ok(())
}

pub struct SortOperator {
    input: Arc<Mutex<dyn Operator>>,
    order_by: Vec<SortSpec>,
    sorter: Arc<dyn RowSorter>,
    evaluator: Arc<dyn RowEvaluator>,
    session: Arc<Session>,
    output_iter: Option<std::vec::IntoIter<Row>>,
}

impl SortOperator {
    pub fn new(input: Arc<Mutex<dyn Operator>>, order_by: Vec<SortSpec>, session: Arc<Session>) -> Self {
        SortOperator {
            input,
            order_by,
            sorter: Arc::new(StableSorter),
            evaluator: Arc::new(AstEvaluator),
            session,
            output_iter: None,
        }
    }
}

impl Operator for SortOperator {
    fn init(&mut self) -> QueryResult<()> {
        self.output_iter = None;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        if self.output_iter.is_none() {
            let mut all_rows = Vec::new();
            {
                let mut input_op = lock_operator(&self.input)?;
                input_op.init()?;
                while let Some(row) = input_op.next()? {
                    all_rows.push(row);
                }
                input_op.close()?;
            }

            let ctx = self.session.context()?;
            sort_rows(self.sorter.as_ref(), &self.order_by, &mut all_rows, self.evaluator.as_ref(), &ctx)?;
            debug!("sort operator ordered {} rows by {} keys", all_rows.len(), self.order_by.len());
            self.output_iter = Some(all_rows.into_iter());
        }

        Ok(self.output_iter.as_mut().and_then(|iter| iter.next()))
    }

    fn close(&mut self) -> QueryResult<()> {
        // input was closed after it was drained
        self.output_iter = None;
        Ok(())
    }
}

pub fn create_sort_operator(
    input: Arc<Mutex<dyn Operator>>,
    order_by: Vec<SortSpec>,
    session: Arc<Session>,
) -> QueryResult<Arc<Mutex<dyn Operator>>> {
    let op = SortOperator::new(input, order_by, session);
    Ok(Arc::new(Mutex::new(op)))
}
