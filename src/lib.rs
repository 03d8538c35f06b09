// GROUP_CONCAT Aggregation Engine

pub mod query;

// Re-export key items for convenient access
pub use query::ast::{DataType, Expression, Value};
pub use query::executor::context::{ExecutionContext, Session};
pub use query::executor::expression_eval::{AstEvaluator, RowEvaluator};
pub use query::executor::operators::agg::{
    AggregateDescriptor, Aggregation, Capabilities, GroupConcat, GroupConcatBuffer, GroupConcatConfig,
};
pub use query::executor::operators::sort::{NullOrdering, RowSorter, SortDirection, SortSpec, StableSorter};
pub use query::executor::result::{DataValue, QueryError, QueryResult, QueryResultSet, Row};
pub use query::executor::type_conversion::{LongTextConverter, TextConversion, TextConverter};
