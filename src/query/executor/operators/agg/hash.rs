// Hash-based Aggregation Operator
//
// This operator implements aggregation using a hash table to group rows.
// With a parallelism above one the input is split into contiguous shards,
// each shard is aggregated into partial buffers on its own thread, and the
// partials are merged back in shard order.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use super::Aggregation;
use crate::query::executor::context::{ExecutionContext, Session};
use crate::query::executor::operators::{Operator, collect_rows};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Row};

/// Key for the grouping hash table - combination of values from GROUP BY columns.
///
/// Floats group by their canonical bits: every NaN falls into one group and
/// `-0.0` joins `0.0`. The output row carries the first value seen.
#[derive(Debug, Clone)]
pub(super) struct GroupKey {
    values: Vec<DataValue>,
}

fn canonical_float_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0.0_f64.to_bits()
    } else {
        f.to_bits()
    }
}

fn same_group_value(a: &DataValue, b: &DataValue) -> bool {
    match (a, b) {
        (DataValue::Float(x), DataValue::Float(y)) => canonical_float_bits(*x) == canonical_float_bits(*y),
        _ => a == b,
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self.values.iter().zip(&other.values).all(|(a, b)| same_group_value(a, b))
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.len().hash(state);
        for value in &self.values {
            match value {
                DataValue::Float(f) => DataValue::Float(f64::from_bits(canonical_float_bits(*f))).hash(state),
                other => other.hash(state),
            }
        }
    }
}

impl GroupKey {
    /// Extract a group key from a row based on column names
    pub(super) fn from_row(row: &Row, columns: &[String]) -> QueryResult<Self> {
        let mut values = Vec::with_capacity(columns.len());

        for col in columns {
            let value = match row.get(col) {
                Some(val) => val.clone(),
                None => return Err(QueryError::ColumnNotFound(col.clone())),
            };
            values.push(value);
        }

        Ok(GroupKey { values })
    }

    /// Build the output row: group columns first, then the aggregate
    pub(super) fn into_row(self, group_by_columns: &[String], output_column: &str, value: DataValue) -> Row {
        let mut row = Row::from_values(group_by_columns.to_vec(), self.values);
        row.set(output_column.to_string(), value);
        row
    }
}

/// Group buffers plus the order in which each group was first seen
struct GroupTable<B> {
    order: Vec<GroupKey>,
    buffers: HashMap<GroupKey, B>,
}

impl<B> GroupTable<B> {
    fn new() -> Self {
        GroupTable {
            order: Vec::new(),
            buffers: HashMap::new(),
        }
    }

    fn buffer_mut(&mut self, key: GroupKey, init: impl FnOnce() -> B) -> &mut B {
        match self.buffers.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.order.push(entry.key().clone());
                entry.insert(init())
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

fn aggregate_shard<A: Aggregation>(
    aggregation: &A,
    group_by_columns: &[String],
    ctx: &ExecutionContext,
    rows: &[Row],
) -> QueryResult<GroupTable<A::Buffer>> {
    let mut groups = GroupTable::new();
    for row in rows {
        let key = GroupKey::from_row(row, group_by_columns)?;
        let buffer = groups.buffer_mut(key, || aggregation.new_buffer());
        aggregation.update(ctx, buffer, row)?;
    }
    trace!("aggregated shard of {} rows into {} groups", rows.len(), groups.len());
    Ok(groups)
}

/// Fold a later shard's groups into `target`. Groups first seen in `partial`
/// are appended after the groups `target` already holds.
fn merge_tables<A: Aggregation>(
    aggregation: &A,
    ctx: &ExecutionContext,
    target: &mut GroupTable<A::Buffer>,
    partial: GroupTable<A::Buffer>,
) -> QueryResult<()> {
    let GroupTable { order, mut buffers } = partial;
    for key in order {
        let buffer = buffers.remove(&key).ok_or_else(|| {
            QueryError::ExecutionError("Partial group buffer missing during merge".to_string())
        })?;
        match target.buffers.entry(key) {
            Entry::Occupied(mut entry) => aggregation.merge(ctx, entry.get_mut(), buffer)?,
            Entry::Vacant(entry) => {
                target.order.push(entry.key().clone());
                entry.insert(buffer);
            }
        }
    }
    Ok(())
}

/// HashAggregateOperator performs grouping and aggregation using a hash table
pub struct HashAggregateOperator<A: Aggregation> {
    // Input operator
    input: Arc<Mutex<dyn Operator>>,
    // Group by column references
    group_by_columns: Vec<String>,
    // Aggregate function applied to every group
    aggregation: Arc<A>,
    // Name of the aggregate column in the output rows
    output_column: String,
    // Source of group_concat_max_len and other session variables
    session: Arc<Session>,
    // Number of shards aggregated concurrently
    parallelism: usize,
    // Has this operator been initialized
    initialized: bool,
    // Iterator over the resulting rows
    result_iter: Option<std::vec::IntoIter<Row>>,
}

impl<A: Aggregation> HashAggregateOperator<A> {
    /// Create a new hash aggregate operator
    pub fn new(
        input: Arc<Mutex<dyn Operator>>,
        group_by_columns: Vec<String>,
        aggregation: Arc<A>,
        output_column: impl Into<String>,
        session: Arc<Session>,
    ) -> Self {
        HashAggregateOperator {
            input,
            group_by_columns,
            aggregation,
            output_column: output_column.into(),
            session,
            parallelism: 1,
            initialized: false,
            result_iter: None,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    fn build_groups(&self, ctx: &ExecutionContext, rows: &[Row]) -> QueryResult<GroupTable<A::Buffer>> {
        let aggregation = self.aggregation.as_ref();
        let group_by = self.group_by_columns.as_slice();

        if self.parallelism <= 1 || rows.len() < 2 {
            return aggregate_shard(aggregation, group_by, ctx, rows);
        }

        let shard_size = rows.len().div_ceil(self.parallelism);
        debug!(
            "hash aggregate: splitting {} rows into shards of {} across {} workers",
            rows.len(),
            shard_size,
            self.parallelism
        );

        let partials = crossbeam::scope(|scope| {
            let handles: Vec<_> = rows
                .chunks(shard_size)
                .map(|shard| scope.spawn(move |_| aggregate_shard(aggregation, group_by, ctx, shard)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(QueryError::ExecutionError("Aggregation worker panicked".to_string()))
                    })
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| QueryError::ExecutionError("Aggregation worker panicked".to_string()))?;

        let mut merged = GroupTable::new();
        for partial in partials {
            merge_tables(aggregation, ctx, &mut merged, partial?)?;
        }
        Ok(merged)
    }

    fn compute(&self) -> QueryResult<Vec<Row>> {
        let rows = collect_rows(&self.input)?;
        let ctx = self.session.context()?;
        let mut groups = self.build_groups(&ctx, &rows)?;

        // A global aggregate still produces one row for empty input
        if self.group_by_columns.is_empty() && groups.order.is_empty() {
            groups.buffer_mut(GroupKey { values: Vec::new() }, || self.aggregation.new_buffer());
        }

        debug!("hash aggregate: {} input rows, {} groups", rows.len(), groups.len());

        let GroupTable { order, mut buffers } = groups;
        let mut result_rows = Vec::with_capacity(order.len());
        for key in order {
            let buffer = buffers.remove(&key).ok_or_else(|| {
                QueryError::ExecutionError("Group buffer missing during evaluation".to_string())
            })?;
            // Variables are read again for every group
            let ctx = self.session.context()?;
            let value = self.aggregation.eval(&ctx, buffer)?;
            result_rows.push(key.into_row(&self.group_by_columns, &self.output_column, value));
        }
        Ok(result_rows)
    }
}

impl<A: Aggregation> Operator for HashAggregateOperator<A> {
    fn init(&mut self) -> QueryResult<()> {
        if !self.initialized {
            let result_rows = self.compute()?;
            self.result_iter = Some(result_rows.into_iter());
            self.initialized = true;
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        // Ensure we're initialized
        if !self.initialized {
            self.init()?;
        }

        Ok(self.result_iter.as_mut().and_then(|iter| iter.next()))
    }

    fn close(&mut self) -> QueryResult<()> {
        // input is drained and closed during init
        self.initialized = false;
        self.result_iter = None;
        Ok(())
    }
}

/// Create a new HashAggregateOperator
pub fn create_hash_aggregate<A: Aggregation + 'static>(
    input: Arc<Mutex<dyn Operator>>,
    group_by_columns: Vec<String>,
    aggregation: Arc<A>,
    output_column: impl Into<String>,
    session: Arc<Session>,
    parallelism: usize,
) -> QueryResult<Arc<Mutex<dyn Operator>>> {
    if parallelism == 0 {
        return Err(QueryError::ConfigurationError(
            "Hash aggregate parallelism must be at least 1".to_string(),
        ));
    }

    let operator = HashAggregateOperator::new(input, group_by_columns, aggregation, output_column, session)
        .with_parallelism(parallelism);

    Ok(Arc::new(Mutex::new(operator)))
}
