//! Data models for the Osler MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod schema;

pub use query::{ColumnMetadata, QueryResult};
pub use schema::{
    ColumnDefinition, DEFAULT_SCHEMA, TableDescription, TableInfo, TableRef, TableType,
};
