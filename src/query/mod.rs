// Query Processing Module
//
// This module contains the expression tree and the execution components
// that evaluate GROUP_CONCAT over grouped rows.

pub mod ast;
pub mod executor;

// Export key public interfaces
pub use executor::result::QueryResult;
