//! Query layer errors.

use coinwatch_client::ApiError;
use thiserror::Error;

/// Failure of a query fetch.
///
/// Cloned to every caller waiting on the same in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The fetch leading this key was dropped before it finished.
    #[error("query for `{0}` was cancelled")]
    Cancelled(String),
    /// The stored value has a different type than the one requested.
    #[error("cached value for `{0}` has an unexpected type")]
    TypeMismatch(String),
}

impl QueryError {
    /// Returns `true` if retrying the fetch may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            QueryError::Api(error) => error.is_retriable(),
            QueryError::Cancelled(_) => true,
            QueryError::TypeMismatch(_) => false,
        }
    }

    /// User-facing message.
    pub fn message(&self) -> String {
        match self {
            QueryError::Api(error) => error.message().to_owned(),
            other => other.to_string(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
