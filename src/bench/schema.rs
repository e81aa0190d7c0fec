//! Provider-neutral tool catalog and run telemetry records.

use crate::error::RunError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type JsonObject = serde_json::Map<String, JsonValue>;

/// A tool definition as advertised by the MCP server.
///
/// Field names follow the MCP wire format so an `rmcp` tool converts through
/// serde without a hand-written mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<JsonValue>,
    #[serde(default, rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<JsonValue>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            output_schema: None,
            title: None,
            annotations: None,
            meta: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// One tool invocation made during a run, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub tool_name: String,
    pub arguments: JsonObject,
    pub model: String,
    pub latency_ms: u64,
}

/// Outcome of one prompt driven through the conversation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    /// Provider-issued response id of the last turn; empty when not applicable.
    pub session_id: String,
    /// The prompt as given, before any tool policy is prepended.
    pub query: String,
    pub response_text: String,
    pub tool_calls: Vec<ToolCallEvent>,
    pub total_latency_ms: u64,
    pub error: Option<String>,
}

impl ModelResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Tool names in call order, joined with "; ".
    pub fn tool_names(&self) -> String {
        self.tool_calls
            .iter()
            .map(|c| c.tool_name.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// `name: {json args}` per call, joined with "; ".
    pub fn tool_arguments(&self) -> String {
        self.tool_calls
            .iter()
            .map(|c| {
                format!(
                    "{}: {}",
                    c.tool_name,
                    JsonValue::Object(c.arguments.clone())
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn total_runtime_s(&self) -> f64 {
        self.total_latency_ms as f64 / 1000.0
    }
}

impl From<RunError> for ModelResponse {
    fn from(err: RunError) -> Self {
        Self {
            error: Some(err.source.to_string()),
            model: err.model,
            session_id: err.session_id,
            query: err.query,
            response_text: String::new(),
            tool_calls: err.tool_calls,
            total_latency_ms: err.elapsed_ms,
        }
    }
}
