//! The model backend capability the conversation loop is written against.

use crate::bench::schema::ToolSchema;
use crate::bench::transcript::{Message, ToolUseRequest};
use crate::error::BackendError;
use serde::Serialize;
use std::future::Future;

/// What one model round trip produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Terminal answer, as the provider's text segments.
    Final { text: Vec<String> },
    /// The model wants tools run before it continues.
    ToolUse {
        text: Vec<String>,
        requests: Vec<ToolUseRequest>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    /// Provider response id; empty when the provider has none.
    pub id: String,
    pub reply: ModelReply,
}

/// A model provider able to take one turn of a tool-calling conversation.
///
/// Implementations issue a single request per `send` and never retry.
pub trait ModelBackend: Send + Sync {
    /// Provider-specific tool declaration.
    type ToolDecl: Serialize + Send + Sync;

    fn provider(&self) -> &'static str;

    fn model(&self) -> &str;

    fn adapt_tools(&self, tools: &[ToolSchema]) -> Vec<Self::ToolDecl>;

    fn send(
        &self,
        transcript: &[Message],
        tools: &[Self::ToolDecl],
    ) -> impl Future<Output = Result<ModelTurn, BackendError>> + Send;
}
