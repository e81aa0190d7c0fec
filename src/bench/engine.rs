//! The tool-calling conversation loop.
//!
//! One prompt goes in; the engine alternates between asking the model for a
//! turn and running the tools it requested until the model answers. Tool
//! calls within a turn run one at a time in the order the model listed them.
//! A failing tool is reported back to the model, while a failing model
//! request ends the run with [`RunError`].

use crate::bench::backend::{ModelBackend, ModelReply};
use crate::bench::bridge::ToolExecutor;
use crate::bench::schema::{ModelResponse, ToolCallEvent, ToolSchema};
use crate::bench::transcript::{Message, ToolUseRequest};
use crate::config::DEFAULT_MAX_TURNS;
use crate::error::RunError;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Model round trips allowed before the run is cut off.
    pub max_turns: usize,
    /// Text prepended to the prompt sent to the model.
    pub tool_policy: Option<String>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            tool_policy: None,
        }
    }
}

pub struct ConversationEngine<B, X> {
    backend: B,
    executor: X,
    options: LoopOptions,
}

impl<B: ModelBackend, X: ToolExecutor> ConversationEngine<B, X> {
    pub fn new(backend: B, executor: X, options: LoopOptions) -> Self {
        Self {
            backend,
            executor,
            options,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    pub fn into_executor(self) -> X {
        self.executor
    }

    /// Drive `prompt` to a final answer.
    ///
    /// Running out of turns is not an error: the response comes back with
    /// `error` set and whatever tool calls were made.
    pub async fn run(&self, prompt: &str, tools: &[ToolSchema]) -> Result<ModelResponse, RunError> {
        let started = Instant::now();
        let model = self.backend.model().to_string();

        let first_message = match &self.options.tool_policy {
            Some(policy) => format!("{policy}\n\n{prompt}"),
            None => prompt.to_string(),
        };
        let mut transcript = vec![Message::user(first_message)];
        let declarations = self.backend.adapt_tools(tools);
        let mut tool_calls: Vec<ToolCallEvent> = Vec::new();
        let mut session_id = String::new();

        for turn in 1..=self.options.max_turns {
            debug!(
                model = %model,
                turn,
                messages = transcript.len(),
                "Requesting model turn"
            );

            let reply = match self.backend.send(&transcript, &declarations).await {
                Ok(reply) => reply,
                Err(source) => {
                    return Err(RunError {
                        model,
                        query: prompt.to_string(),
                        session_id,
                        source,
                        tool_calls,
                        elapsed_ms: elapsed_ms(started),
                    });
                }
            };
            session_id = reply.id;

            let (text, requests) = match reply.reply {
                ModelReply::ToolUse { text, requests } if !requests.is_empty() => (text, requests),
                ModelReply::ToolUse { text, .. } | ModelReply::Final { text } => {
                    let response = ModelResponse {
                        model,
                        session_id,
                        query: prompt.to_string(),
                        response_text: text.join(" "),
                        tool_calls,
                        total_latency_ms: elapsed_ms(started),
                        error: None,
                    };
                    info!(
                        model = %response.model,
                        turns = turn,
                        tool_calls = response.tool_calls.len(),
                        latency_ms = response.total_latency_ms,
                        "Run completed"
                    );
                    return Ok(response);
                }
            };

            transcript.push(Message::Assistant {
                text,
                tool_uses: requests.clone(),
            });

            for request in requests {
                let (event, result) = self.call_tool(&model, request).await;
                tool_calls.push(event);
                transcript.push(result);
            }
        }

        warn!(
            model = %model,
            max_turns = self.options.max_turns,
            tool_calls = tool_calls.len(),
            "Maximum turns exceeded"
        );
        Ok(ModelResponse {
            model,
            session_id,
            query: prompt.to_string(),
            response_text: String::new(),
            tool_calls,
            total_latency_ms: elapsed_ms(started),
            error: Some(format!(
                "Maximum turns ({}) exceeded",
                self.options.max_turns
            )),
        })
    }

    /// Run one requested tool; the event is recorded whether or not it succeeds.
    async fn call_tool(&self, model: &str, request: ToolUseRequest) -> (ToolCallEvent, Message) {
        let call_started = Instant::now();
        let outcome = self
            .executor
            .execute(&request.name, &request.arguments)
            .await;
        let latency_ms = elapsed_ms(call_started);

        let (content, is_error) = match outcome {
            Ok(text) => {
                debug!(tool = %request.name, latency_ms, "Tool call succeeded");
                (text, false)
            }
            Err(e) => {
                warn!(tool = %request.name, latency_ms, error = %e, "Tool call failed");
                (format!("Error: {e}"), true)
            }
        };

        let event = ToolCallEvent {
            tool_name: request.name.clone(),
            arguments: request.arguments,
            model: model.to_string(),
            latency_ms,
        };
        let result = Message::ToolResult {
            call_id: request.id,
            tool_name: request.name,
            content,
            is_error,
        };
        (event, result)
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
