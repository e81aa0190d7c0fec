//! Anthropic Messages API backend.

use crate::bench::adapter::{AnthropicToolDecl, to_anthropic};
use crate::bench::backend::{ModelBackend, ModelReply, ModelTurn};
use crate::bench::providers::post_json;
use crate::bench::schema::{JsonObject, ToolSchema};
use crate::bench::transcript::{Message, ToolUseRequest};
use crate::error::BackendError;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: reqwest::Client,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| BackendError::config(format!("Invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::http(PROVIDER, e.to_string()))?;

        Ok(Self {
            client,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

impl ModelBackend for AnthropicBackend {
    type ToolDecl = AnthropicToolDecl;

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn adapt_tools(&self, tools: &[ToolSchema]) -> Vec<AnthropicToolDecl> {
        to_anthropic(tools)
    }

    async fn send(
        &self,
        transcript: &[Message],
        tools: &[AnthropicToolDecl],
    ) -> Result<ModelTurn, BackendError> {
        let body = build_request(&self.model, self.max_tokens, transcript, tools);
        let text = post_json(&self.client, PROVIDER, &self.endpoint(), &body).await?;
        parse_response(&text)
    }
}

/// Messages API request body for the transcript so far.
pub fn build_request(
    model: &str,
    max_tokens: u32,
    transcript: &[Message],
    tools: &[AnthropicToolDecl],
) -> JsonValue {
    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": convert_messages(transcript),
    });
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }
    body
}

// Consecutive tool results travel together in a single user message.
fn convert_messages(transcript: &[Message]) -> Vec<JsonValue> {
    let mut out = Vec::new();
    let mut pending_results: Vec<JsonValue> = Vec::new();

    for message in transcript {
        if !message.is_tool_result() && !pending_results.is_empty() {
            out.push(json!({"role": "user", "content": std::mem::take(&mut pending_results)}));
        }

        match message {
            Message::User { text } => {
                out.push(json!({"role": "user", "content": text}));
            }
            Message::Assistant { text, tool_uses } => {
                let mut blocks: Vec<JsonValue> = text
                    .iter()
                    .filter(|t| !t.is_empty())
                    .map(|t| json!({"type": "text", "text": t}))
                    .collect();
                blocks.extend(tool_uses.iter().map(|request| {
                    json!({
                        "type": "tool_use",
                        "id": request.id,
                        "name": request.name,
                        "input": request.arguments,
                    })
                }));
                out.push(json!({"role": "assistant", "content": blocks}));
            }
            Message::ToolResult {
                call_id,
                content,
                is_error,
                ..
            } => {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": content,
                });
                if *is_error {
                    block["is_error"] = JsonValue::Bool(true);
                }
                pending_results.push(block);
            }
        }
    }

    if !pending_results.is_empty() {
        out.push(json!({"role": "user", "content": pending_results}));
    }
    out
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Option<Vec<ContentBlock>>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: JsonValue,
    },
    #[serde(other)]
    Other,
}

/// Parse a Messages API response body into a turn.
pub fn parse_response(body: &str) -> Result<ModelTurn, BackendError> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).map_err(|e| BackendError::decode(PROVIDER, e.to_string()))?;

    let mut text = Vec::new();
    let mut requests = Vec::new();
    for block in parsed.content.unwrap_or_default() {
        match block {
            ContentBlock::Text { text: t } => text.push(t),
            ContentBlock::ToolUse { id, name, input } => requests.push(ToolUseRequest {
                id,
                name,
                arguments: into_object(input),
            }),
            ContentBlock::Other => {}
        }
    }

    let reply = if parsed.stop_reason.as_deref() == Some("tool_use") {
        ModelReply::ToolUse { text, requests }
    } else {
        ModelReply::Final { text }
    };

    Ok(ModelTurn {
        id: parsed.id.unwrap_or_default(),
        reply,
    })
}

fn into_object(value: JsonValue) -> JsonObject {
    match value {
        JsonValue::Object(map) => map,
        _ => JsonObject::new(),
    }
}
