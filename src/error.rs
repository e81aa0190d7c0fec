//! Error types for the Osler MCP server and benchmark harness.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Server-side variants carry actionable suggestions because the caller reading them
//! is usually a model that has to recover on its next turn.

use crate::bench::schema::ToolCallEvent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database { message: String, suggestion: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with a helpful suggestion.
    pub fn database(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors to StoreError.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => StoreError::connection(
                msg.to_string(),
                "Check the database path and connection options",
            ),
            sqlx::Error::Database(db_err) => StoreError::database(
                db_err.message(),
                "Check the SQL syntax and referenced objects",
            ),
            sqlx::Error::RowNotFound => StoreError::database(
                "No rows returned",
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => StoreError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                StoreError::connection("Connection pool is closed", "Restart the server")
            }
            sqlx::Error::Io(io_err) => StoreError::connection(
                format!("I/O error: {}", io_err),
                "Check that the database file exists and is readable",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                StoreError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                StoreError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => StoreError::internal("Database worker crashed"),
            _ => StoreError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for analytical store operations.
pub type StoreResult<T> = Result<T, StoreError>;

fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert StoreError to MCP ErrorData for semantic error categorization.
impl From<StoreError> for rmcp::ErrorData {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::InvalidInput { .. } | StoreError::Schema { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }
            StoreError::Database { suggestion, .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(Some(suggestion)))
            }
            StoreError::Connection { suggestion, .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(Some(suggestion)))
            }
            StoreError::Timeout { .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                suggestion_data(Some("Narrow the query or add a LIMIT clause")),
            ),
            StoreError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), None),
        }
    }
}

/// Failure of a single model backend round trip.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{provider} request failed: {message}")]
    Http { provider: &'static str, message: String },

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} response could not be decoded: {message}")]
    Decode { provider: &'static str, message: String },

    #[error("Backend configuration error: {message}")]
    Config { message: String },
}

impl BackendError {
    pub fn http(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Http {
            provider,
            message: message.into(),
        }
    }

    pub fn decode(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            provider,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Failure raised by the tool executor bridge.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("MCP call failed: {0}")]
    Transport(String),

    #[error("{0}")]
    Reported(String),
}

/// Fatal failure of a conversation run.
///
/// Tool failures never end up here; they are fed back to the model instead.
#[derive(Error, Debug)]
#[error("Run for model '{model}' failed after {elapsed_ms}ms: {source}")]
pub struct RunError {
    pub model: String,
    pub query: String,
    /// Provider id of the last turn that succeeded, empty if none did.
    pub session_id: String,
    #[source]
    pub source: BackendError,
    /// Tool calls completed before the failure, in call order.
    pub tool_calls: Vec<ToolCallEvent>,
    pub elapsed_ms: u64,
}

/// Errors surfaced by the benchmark driver.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP session error: {0}")]
    Mcp(String),

    #[error("Input CSV has no '{0}' column")]
    MissingColumn(String),

    #[error("Benchmark aborted: {0}")]
    Aborted(#[from] RunError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl BenchError {
    pub fn mcp(err: impl std::fmt::Display) -> Self {
        Self::Mcp(err.to_string())
    }
}
