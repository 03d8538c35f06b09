// Execution Context and Session Variables
//
// Session-scoped settings live in a `Session`; operators take a snapshot of
// them as an `ExecutionContext` and pass it explicitly into evaluation.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use log::debug;

use crate::query::executor::result::{DataValue, QueryError, QueryResult};

/// Name of the variable bounding GROUP_CONCAT output length
pub const GROUP_CONCAT_MAX_LEN: &str = "group_concat_max_len";

/// Default maximum GROUP_CONCAT output length
pub const DEFAULT_GROUP_CONCAT_MAX_LEN: usize = 1024;

/// Settings visible to a single evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Maximum length, in characters, of a GROUP_CONCAT result
    pub group_concat_max_len: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext {
            group_concat_max_len: DEFAULT_GROUP_CONCAT_MAX_LEN,
        }
    }
}

impl ExecutionContext {
    pub fn with_group_concat_max_len(max_len: usize) -> Self {
        ExecutionContext { group_concat_max_len: max_len }
    }
}

/// Named session variables shared by the operators of one session
#[derive(Debug)]
pub struct Session {
    variables: RwLock<HashMap<String, DataValue>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session with every known variable at its default
    pub fn new() -> Self {
        let mut variables = HashMap::new();
        variables.insert(
            GROUP_CONCAT_MAX_LEN.to_string(),
            DataValue::Integer(DEFAULT_GROUP_CONCAT_MAX_LEN as i64),
        );
        Session {
            variables: RwLock::new(variables),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Look up a variable by name (case-insensitive)
    pub fn get_variable(&self, name: &str) -> Option<DataValue> {
        self.variables.read().get(&name.to_ascii_lowercase()).cloned()
    }

    /// Set a known variable, validating its type and range
    pub fn set_variable(&self, name: &str, value: DataValue) -> QueryResult<()> {
        let key = name.to_ascii_lowercase();
        match key.as_str() {
            GROUP_CONCAT_MAX_LEN => match value {
                DataValue::Integer(i) if i >= 0 => {}
                DataValue::Integer(i) => {
                    return Err(QueryError::ConfigurationError(format!(
                        "{} must not be negative, got {}", GROUP_CONCAT_MAX_LEN, i
                    )));
                }
                other => {
                    return Err(QueryError::ConfigurationError(format!(
                        "{} expects an integer, got {:?}", GROUP_CONCAT_MAX_LEN, other.get_type()
                    )));
                }
            },
            _ => return Err(QueryError::ConfigurationError(format!("Unknown session variable: {}", name))),
        }

        debug!("session variable {} set to {}", key, value);
        self.variables.write().insert(key, value);
        Ok(())
    }

    /// Snapshot the current settings for one evaluation
    pub fn context(&self) -> QueryResult<ExecutionContext> {
        let variables = self.variables.read();
        let max_len = match variables.get(GROUP_CONCAT_MAX_LEN) {
            Some(DataValue::Integer(i)) => usize::try_from(*i).map_err(|_| {
                QueryError::ConfigurationError(format!("{} out of range: {}", GROUP_CONCAT_MAX_LEN, i))
            })?,
            Some(other) => {
                return Err(QueryError::ConfigurationError(format!(
                    "{} has unexpected value {}", GROUP_CONCAT_MAX_LEN, other
                )));
            }
            None => DEFAULT_GROUP_CONCAT_MAX_LEN,
        };
        Ok(ExecutionContext::with_group_concat_max_len(max_len))
    }
}
