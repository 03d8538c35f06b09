// Aggregation Operators Module
//
// This module contains the aggregate function lifecycle and the operators
// that drive it over grouped input (hash-based and sort-based).

mod group_concat;
mod hash;
mod sort;

use std::fmt;

use crate::query::ast::{DataType, Expression};
use crate::query::executor::context::ExecutionContext;
use crate::query::executor::result::{DataValue, QueryResult, Row};

// Re-export public components
pub use group_concat::{
    AugmentedRow, Capabilities, DistinctSet, GroupConcat, GroupConcatBuffer, GroupConcatConfig,
    RESERVED_COLUMN, VALUE_COLUMN, truncate_to_len,
};
pub use hash::{HashAggregateOperator, create_hash_aggregate};
pub use sort::{SortAggregateOperator, create_sort_aggregate};

/// Four-step lifecycle of an aggregate function over one group.
///
/// A buffer belongs to exactly one group. `update` and `merge` must be
/// serialized per buffer; independent buffers may be filled on different
/// threads and folded together with `merge` before `eval`.
pub trait Aggregation: Send + Sync {
    type Buffer: Send;

    /// Fresh, empty state for a new group
    fn new_buffer(&self) -> Self::Buffer;

    /// Fold one input row into the group's state
    fn update(&self, ctx: &ExecutionContext, buffer: &mut Self::Buffer, row: &Row) -> QueryResult<()>;

    /// Fold a partial state computed elsewhere into `buffer`
    fn merge(&self, ctx: &ExecutionContext, buffer: &mut Self::Buffer, partial: Self::Buffer) -> QueryResult<()>;

    /// Produce the group's result, consuming its state
    fn eval(&self, ctx: &ExecutionContext, buffer: Self::Buffer) -> QueryResult<DataValue>;
}

/// Introspection surface an aggregate exposes to the surrounding expression tree.
pub trait AggregateDescriptor: fmt::Display {
    /// Stable name identifying the aggregate kind
    fn function_name(&self) -> &'static str;

    fn resolved(&self) -> bool;

    fn data_type(&self) -> DataType;

    fn is_nullable(&self) -> bool;

    fn children(&self) -> Vec<Expression>;

    /// Rebuild the aggregate from a replacement list of children, in the
    /// order returned by [`AggregateDescriptor::children`].
    fn with_children(&self, children: Vec<Expression>) -> QueryResult<Self>
    where
        Self: Sized;
}
