//! Provider-neutral conversation transcript.

use crate::bench::schema::JsonObject;

/// A model's request to invoke one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseRequest {
    /// Provider call id, echoed back on the matching tool result.
    pub id: String,
    pub name: String,
    pub arguments: JsonObject,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User {
        text: String,
    },
    Assistant {
        text: Vec<String>,
        tool_uses: Vec<ToolUseRequest>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}
