//! Database abstraction layer.
//!
//! This module provides read-only access to the analytical store:
//! - The `AnalyticsStore` capability used by the MCP tools
//! - A SQLite implementation with attached schemas
//! - Row to JSON type mappings

pub mod store;
pub mod types;

pub use store::{AnalyticsStore, Attachment, SAMPLE_ROWS, SqliteStore};
