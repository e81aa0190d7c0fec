//! Tool-calling benchmark harness.
//!
//! - `schema`: tool catalog and run telemetry types
//! - `adapter`: catalog translation into provider tool declarations
//! - `transcript`: provider-neutral conversation messages
//! - `backend`: the model capability the loop is written against
//! - `providers`: Anthropic and OpenAI-compatible backends
//! - `bridge`: tool execution through an MCP client session
//! - `engine`: the conversation loop
//! - `driver`: CSV batch runner

pub mod adapter;
pub mod backend;
pub mod bridge;
pub mod driver;
pub mod engine;
pub mod providers;
pub mod schema;
pub mod transcript;

pub use backend::{ModelBackend, ModelReply, ModelTurn};
pub use bridge::{McpToolExecutor, ToolExecutor};
pub use driver::{BenchSummary, CsvSink, QueryBatch, run_benchmark};
pub use engine::{ConversationEngine, LoopOptions};
pub use schema::{JsonObject, ModelResponse, ToolCallEvent, ToolSchema};
pub use transcript::{Message, ToolUseRequest};
