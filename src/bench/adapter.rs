//! Tool catalog translation into provider declaration formats.
//!
//! The translation is a field rename per provider. A missing input schema
//! becomes an empty object schema because some providers reject tools
//! without one.

use crate::bench::schema::ToolSchema;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

/// `{"type": "object", "properties": {}, "required": []}`
pub fn default_input_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

fn input_schema_of(tool: &ToolSchema) -> JsonValue {
    match &tool.input_schema {
        Some(schema) if !schema.is_null() => schema.clone(),
        _ => default_input_schema(),
    }
}

fn description_of(tool: &ToolSchema) -> String {
    tool.description.clone().unwrap_or_default()
}

/// Anthropic Messages API tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropicToolDecl {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

/// OpenAI Chat Completions tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiToolDecl {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: OpenAiFunctionDecl,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiFunctionDecl {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
}

pub fn to_anthropic(tools: &[ToolSchema]) -> Vec<AnthropicToolDecl> {
    tools
        .iter()
        .map(|tool| AnthropicToolDecl {
            name: tool.name.clone(),
            description: description_of(tool),
            input_schema: input_schema_of(tool),
        })
        .collect()
}

pub fn to_openai(tools: &[ToolSchema]) -> Vec<OpenAiToolDecl> {
    tools
        .iter()
        .map(|tool| OpenAiToolDecl {
            kind: "function",
            function: OpenAiFunctionDecl {
                name: tool.name.clone(),
                description: description_of(tool),
                parameters: input_schema_of(tool),
            },
        })
        .collect()
}
