// Query Executor Module
//
// This module is responsible for evaluating expressions and aggregates
// against rows. It implements the iterator-based execution model for query
// processing.

// Re-export public components
pub mod context;
pub mod expression_eval;
pub mod type_conversion;
pub mod result;
pub mod operators;

// Export key types
pub use self::context::{ExecutionContext, Session};
pub use self::result::QueryResult;
pub use self::operators::Operator;
