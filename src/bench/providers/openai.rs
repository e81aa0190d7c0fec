//! OpenAI Chat Completions backend, also used for compatible local servers.

use crate::bench::adapter::{OpenAiToolDecl, to_openai};
use crate::bench::backend::{ModelBackend, ModelReply, ModelTurn};
use crate::bench::providers::post_json;
use crate::bench::schema::{JsonObject, ToolSchema};
use crate::bench::transcript::{Message, ToolUseRequest};
use crate::error::BackendError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::warn;

const PROVIDER: &str = "openai";

/// Chat Completions backend for OpenAI and compatible local servers.
pub struct OpenAiBackend {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| BackendError::config(format!("Invalid API key: {e}")))?,
        );
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
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl ModelBackend for OpenAiBackend {
    type ToolDecl = OpenAiToolDecl;

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn adapt_tools(&self, tools: &[ToolSchema]) -> Vec<OpenAiToolDecl> {
        to_openai(tools)
    }

    async fn send(
        &self,
        transcript: &[Message],
        tools: &[OpenAiToolDecl],
    ) -> Result<ModelTurn, BackendError> {
        let body = build_request(&self.model, transcript, tools);
        let text = post_json(&self.client, PROVIDER, &self.endpoint(), &body).await?;
        parse_response(&text)
    }
}

/// Chat Completions request body for the transcript so far.
pub fn build_request(model: &str, transcript: &[Message], tools: &[OpenAiToolDecl]) -> JsonValue {
    let messages: Vec<JsonValue> = transcript.iter().map(convert_message).collect();
    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if !tools.is_empty() {
        body["tools"] = json!(tools);
        body["tool_choice"] = json!("auto");
    }
    body
}

fn convert_message(message: &Message) -> JsonValue {
    match message {
        Message::User { text } => json!({"role": "user", "content": text}),
        Message::Assistant { text, tool_uses } => {
            let content = if text.is_empty() {
                JsonValue::Null
            } else {
                JsonValue::String(text.join(" "))
            };
            let mut msg = json!({"role": "assistant", "content": content});
            if !tool_uses.is_empty() {
                msg["tool_calls"] = tool_uses
                    .iter()
                    .map(|request| {
                        json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": request.name,
                                "arguments": JsonValue::Object(request.arguments.clone()).to_string(),
                            },
                        })
                    })
                    .collect();
            }
            msg
        }
        Message::ToolResult {
            call_id,
            tool_name,
            content,
            ..
        } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "name": tool_name,
            "content": content,
        }),
    }
}

// Compatible servers send explicit nulls for absent fields.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallPayload>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    #[serde(default)]
    id: Option<String>,
    function: FunctionPayload,
}

#[derive(Debug, Deserialize)]
struct FunctionPayload {
    name: String,
    #[serde(default)]
    arguments: Option<JsonValue>,
}

/// Parse a Chat Completions response body into a turn.
pub fn parse_response(body: &str) -> Result<ModelTurn, BackendError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| BackendError::decode(PROVIDER, e.to_string()))?;

    let choice = parsed
        .choices
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::decode(PROVIDER, "response has no choices"))?;

    let text: Vec<String> = choice.message.content.into_iter().collect();

    let reply = if choice.finish_reason.as_deref() == Some("tool_calls") {
        let requests = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolUseRequest {
                arguments: parse_arguments(&call.function.name, call.function.arguments),
                id: call.id.unwrap_or_default(),
                name: call.function.name,
            })
            .collect();
        ModelReply::ToolUse { text, requests }
    } else {
        ModelReply::Final { text }
    };

    Ok(ModelTurn {
        id: parsed.id.unwrap_or_default(),
        reply,
    })
}

/// Arguments normally arrive as a JSON string. Some local servers send the
/// object itself. Anything that does not yield an object becomes `{}`.
fn parse_arguments(tool: &str, raw: Option<JsonValue>) -> JsonObject {
    let parsed = match raw {
        None | Some(JsonValue::Null) => return JsonObject::new(),
        Some(JsonValue::String(text)) if text.trim().is_empty() => return JsonObject::new(),
        Some(JsonValue::String(text)) => serde_json::from_str::<JsonValue>(&text)
            .unwrap_or(JsonValue::String(text)),
        Some(other) => other,
    };
    match parsed {
        JsonValue::Object(map) => map,
        other => {
            warn!(tool, arguments = %other, "Unparseable tool arguments, using {{}}");
            JsonObject::new()
        }
    }
}
