//! Osler MCP Library
//!
//! This library provides an MCP (Model Context Protocol) server exposing guarded
//! analytical SQL tools over a local healthcare database, and a benchmark harness
//! that drives several LLM providers through a shared tool-calling loop against it.

pub mod auth;
pub mod bench;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::ServerConfig;
pub use error::StoreError;
pub use mcp::OslerService;
