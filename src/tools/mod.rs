//! MCP tool implementations.
//!
//! This module contains the analytical tool handlers:
//! - `query`: Gate and execute model-issued SELECT queries
//! - `schema`: List tables and describe a table
//! - `metrics`: Fixed clinical metrics computed from internal SQL
//! - `sql_validator`: The SQL admission gate
//! - `format`: ASCII rendering of results

pub mod format;
pub mod metrics;
pub mod query;
pub mod schema;
pub mod sql_validator;

pub use metrics::MetricsToolHandler;
pub use query::{ExecuteQueryInput, QueryToolHandler};
pub use schema::{SchemaToolHandler, TableInfoInput};
pub use sql_validator::{Rejection, SqlVerdict, validate_query};
