// GROUP_CONCAT Aggregate
//
// Collects one text value per row of a group, optionally dropping repeated
// values and ordering the rows, then joins the values with a separator and
// bounds the result by the session's group_concat_max_len.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::{Serialize, Deserialize};

use super::{AggregateDescriptor, Aggregation};
use crate::query::ast::{DataType, Expression};
use crate::query::executor::context::ExecutionContext;
use crate::query::executor::expression_eval::{AstEvaluator, RowEvaluator};
use crate::query::executor::operators::sort::{RowSorter, SortSpec, StableSorter, sort_rows};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Row};
use crate::query::executor::type_conversion::{LongTextConverter, TextConversion, TextConverter};

/// Trailing placeholder column of an augmented row; always NULL
pub const RESERVED_COLUMN: &str = "__group_concat_reserved";

/// Trailing column of an augmented row holding the converted text
pub const VALUE_COLUMN: &str = "__group_concat_value";

const DEFAULT_SEPARATOR: &str = ",";

/// Canonical text keys already accepted into a group
pub type DistinctSet = HashSet<String>;

/// An input row extended with the two trailing group_concat columns.
///
/// The original columns are kept so ORDER BY keys can reference any of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedRow {
    row: Row,
    text: String,
}

impl AugmentedRow {
    /// Any reserved columns already present in `original` are replaced, so the
    /// result is always the original width plus two.
    pub fn new(original: &Row, text: String) -> Self {
        let mut row = original.without_columns(&[RESERVED_COLUMN, VALUE_COLUMN]);
        row.set(RESERVED_COLUMN.to_string(), DataValue::Null);
        row.set(VALUE_COLUMN.to_string(), DataValue::Text(text.clone()));
        AugmentedRow { row, text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    /// The input row without the trailing columns
    pub fn original(&self) -> Row {
        self.row.without_columns(&[RESERVED_COLUMN, VALUE_COLUMN])
    }
}

impl AsRef<Row> for AugmentedRow {
    fn as_ref(&self) -> &Row {
        &self.row
    }
}

/// Per-group state: accepted rows in arrival order plus the distinct keys seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupConcatBuffer {
    rows: Vec<AugmentedRow>,
    distinct: DistinctSet,
}

impl GroupConcatBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[AugmentedRow] {
        &self.rows
    }

    pub fn distinct_keys(&self) -> &DistinctSet {
        &self.distinct
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Encode the buffer so a partial result can move between aggregation phases
    pub fn to_bytes(&self) -> QueryResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> QueryResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Immutable configuration of one GROUP_CONCAT call
#[derive(Debug, Clone, PartialEq)]
pub struct GroupConcatConfig {
    /// Name of the deduplication key when DISTINCT was requested
    pub distinct: Option<String>,
    pub order_by: Vec<SortSpec>,
    pub separator: String,
    pub select_exprs: Vec<Expression>,
}

impl GroupConcatConfig {
    pub fn new(select_exprs: Vec<Expression>) -> Self {
        GroupConcatConfig {
            distinct: None,
            order_by: Vec::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
            select_exprs,
        }
    }

    pub fn distinct(mut self, key: impl Into<String>) -> Self {
        self.distinct = Some(key.into());
        self
    }

    pub fn order_by(mut self, order_by: Vec<SortSpec>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

/// Host capabilities the aggregate calls into
#[derive(Clone)]
pub struct Capabilities {
    pub evaluator: Arc<dyn RowEvaluator>,
    pub converter: Arc<dyn TextConverter>,
    pub sorter: Arc<dyn RowSorter>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            evaluator: Arc::new(AstEvaluator),
            converter: Arc::new(LongTextConverter),
            sorter: Arc::new(StableSorter),
        }
    }
}

#[derive(Clone)]
pub struct GroupConcat {
    config: GroupConcatConfig,
    capabilities: Capabilities,
}

impl fmt::Debug for GroupConcat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupConcat").field("config", &self.config).finish_non_exhaustive()
    }
}

impl GroupConcat {
    pub fn new(config: GroupConcatConfig) -> Self {
        Self::with_capabilities(config, Capabilities::default())
    }

    pub fn with_capabilities(config: GroupConcatConfig, capabilities: Capabilities) -> Self {
        GroupConcat { config, capabilities }
    }

    pub fn config(&self) -> &GroupConcatConfig {
        &self.config
    }

    /// Shared accumulation step of `update` and `merge`.
    fn accumulate(&self, ctx: &ExecutionContext, buffer: &mut GroupConcatBuffer, row: &Row) -> QueryResult<()> {
        let values = self.capabilities.evaluator.evaluate_all(&self.config.select_exprs, row, ctx)?;

        let value = match values.into_iter().next() {
            Some(value) if !value.is_null() => value,
            _ => {
                trace!("group_concat: skipping row without a value");
                return Ok(());
            }
        };

        let text = match self.capabilities.converter.to_long_text(&value)? {
            TextConversion::Text(text) => text,
            TextConversion::Null => {
                trace!("group_concat: value {} converted to NULL, skipping", value);
                return Ok(());
            }
        };

        // first occurrence wins
        if self.config.distinct.is_some() && !buffer.distinct.insert(text.clone()) {
            trace!("group_concat: dropping duplicate value {:?}", text);
            return Ok(());
        }

        buffer.rows.push(AugmentedRow::new(row, text));
        Ok(())
    }
}

/// Cut `value` to at most `max_len` characters.
///
/// The limit counts chars rather than bytes, so a multi-byte code point is
/// never split. MySQL counts `group_concat_max_len` in bytes; the two agree
/// only for ASCII output.
pub fn truncate_to_len(mut value: String, max_len: usize) -> String {
    if let Some((byte_index, _)) = value.char_indices().nth(max_len) {
        value.truncate(byte_index);
    }
    value
}

impl Aggregation for GroupConcat {
    type Buffer = GroupConcatBuffer;

    fn new_buffer(&self) -> GroupConcatBuffer {
        GroupConcatBuffer::new()
    }

    fn update(&self, ctx: &ExecutionContext, buffer: &mut GroupConcatBuffer, row: &Row) -> QueryResult<()> {
        self.accumulate(ctx, buffer, row)
    }

    /// Replays every row of `partial` through the accumulation step. The value
    /// expressions are evaluated again, this time against the augmented row.
    fn merge(&self, ctx: &ExecutionContext, buffer: &mut GroupConcatBuffer, partial: GroupConcatBuffer) -> QueryResult<()> {
        debug!(
            "group_concat: merging {} partial rows into buffer of {}",
            partial.rows.len(),
            buffer.rows.len()
        );
        for augmented in &partial.rows {
            self.accumulate(ctx, buffer, augmented.row())?;
        }
        Ok(())
    }

    fn eval(&self, ctx: &ExecutionContext, mut buffer: GroupConcatBuffer) -> QueryResult<DataValue> {
        if buffer.rows.is_empty() {
            return Ok(DataValue::Null);
        }

        if !self.config.order_by.is_empty() {
            sort_rows(
                self.capabilities.sorter.as_ref(),
                &self.config.order_by,
                &mut buffer.rows,
                self.capabilities.evaluator.as_ref(),
                ctx,
            )
            .inspect_err(|e| warn!("group_concat: ordering failed, aborting group: {}", e))?;
        }

        let joined = buffer
            .rows
            .iter()
            .map(AugmentedRow::text)
            .collect::<Vec<_>>()
            .join(&self.config.separator);

        let max_len = ctx.group_concat_max_len;
        let full_len = joined.chars().count();
        if full_len > max_len {
            debug!("group_concat: truncating result from {} to {} characters", full_len, max_len);
        }
        Ok(DataValue::Text(truncate_to_len(joined, max_len)))
    }
}

impl fmt::Display for GroupConcat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group_concat(")?;
        if let Some(distinct) = &self.config.distinct {
            write!(f, "distinct {}", distinct)?;
        } else {
            let exprs: Vec<String> = self.config.select_exprs.iter().map(ToString::to_string).collect();
            write!(f, "{}", exprs.join(", "))?;
        }

        if !self.config.order_by.is_empty() {
            let keys: Vec<String> = self.config.order_by.iter().map(ToString::to_string).collect();
            write!(f, " order by {}", keys.join(", "))?;
        }

        if self.config.separator != DEFAULT_SEPARATOR {
            write!(f, " separator '{}'", self.config.separator)?;
        }

        write!(f, ")")
    }
}

impl AggregateDescriptor for GroupConcat {
    fn function_name(&self) -> &'static str {
        "group_concat"
    }

    fn resolved(&self) -> bool {
        self.config.select_exprs.iter().all(Expression::resolved)
    }

    fn data_type(&self) -> DataType {
        DataType::LongText
    }

    // An empty group evaluates to NULL.
    fn is_nullable(&self) -> bool {
        true
    }

    fn children(&self) -> Vec<Expression> {
        self.config
            .order_by
            .iter()
            .map(|spec| spec.expr.clone())
            .chain(self.config.select_exprs.iter().cloned())
            .collect()
    }

    fn with_children(&self, children: Vec<Expression>) -> QueryResult<Self> {
        let sort_count = self.config.order_by.len();
        if children.is_empty() || children.len() < sort_count {
            return Err(QueryError::InvalidChildrenNumber(format!(
                "{} expects at least {} children ({} order by keys), got {}",
                self.function_name(),
                sort_count.max(1),
                sort_count,
                children.len()
            )));
        }

        let mut children = children;
        let select_exprs = children.split_off(sort_count);
        let order_by = self
            .config
            .order_by
            .iter()
            .zip(children)
            .map(|(spec, expr)| spec.with_expr(expr))
            .collect();

        let config = GroupConcatConfig {
            distinct: self.config.distinct.clone(),
            order_by,
            separator: self.config.separator.clone(),
            select_exprs,
        };
        Ok(GroupConcat::with_capabilities(config, self.capabilities.clone()))
    }
}
