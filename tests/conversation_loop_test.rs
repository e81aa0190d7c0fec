//! Integration tests for the conversation loop with scripted collaborators.
//!
//! `ScriptedBackend` replays a fixed list of model turns and records every
//! transcript it was sent; `ScriptedTools` answers tool calls from a table
//! and can be told to fail for a given input.

use osler_mcp::bench::adapter::{OpenAiToolDecl, to_openai};
use osler_mcp::bench::{
    ConversationEngine, JsonObject, LoopOptions, Message, ModelBackend, ModelReply, ModelTurn,
    ToolExecutor, ToolSchema, ToolUseRequest,
};
use osler_mcp::error::{BackendError, ToolError};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

struct ScriptedBackend {
    turns: Mutex<VecDeque<Result<ModelTurn, BackendError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    /// Repeat the last scripted turn forever once the script runs out.
    repeat_last: Option<ModelTurn>,
}

impl ScriptedBackend {
    fn new(turns: Vec<Result<ModelTurn, BackendError>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
            repeat_last: None,
        }
    }

    fn looping(turn: ModelTurn) -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            repeat_last: Some(turn),
        }
    }

    fn transcripts(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

impl ModelBackend for ScriptedBackend {
    type ToolDecl = OpenAiToolDecl;

    fn provider(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    fn adapt_tools(&self, tools: &[ToolSchema]) -> Vec<OpenAiToolDecl> {
        to_openai(tools)
    }

    async fn send(
        &self,
        transcript: &[Message],
        _tools: &[OpenAiToolDecl],
    ) -> Result<ModelTurn, BackendError> {
        self.seen.lock().unwrap().push(transcript.to_vec());
        tokio::time::sleep(Duration::from_millis(2)).await;
        let next = self.turns.lock().unwrap().pop_front();
        match (next, &self.repeat_last) {
            (Some(turn), _) => turn,
            (None, Some(turn)) => Ok(turn.clone()),
            (None, None) => Err(BackendError::http("scripted", "script exhausted")),
        }
    }
}

struct ScriptedTools {
    calls: Mutex<Vec<String>>,
}

impl ScriptedTools {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolExecutor for ScriptedTools {
    async fn execute(&self, name: &str, arguments: &JsonObject) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push(name.to_string());
        tokio::time::sleep(Duration::from_millis(3)).await;

        let sql = arguments
            .get("sql_query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        match name {
            "execute_query" if sql.contains("wrong_table") => Err(ToolError::Reported(
                "no such table: main.wrong_table".to_string(),
            )),
            "execute_query" => Ok("+------+\n| rate |\n+------+\n|    5 |\n+------+".to_string()),
            "get_database_schema" => Ok("Available tables (1):\nreadmissions.summary".to_string()),
            other => Err(ToolError::Transport(format!("unknown tool {other}"))),
        }
    }
}

fn tool_use(id: &str, requests: Vec<(&str, &str, serde_json::Value)>) -> ModelTurn {
    ModelTurn {
        id: id.to_string(),
        reply: ModelReply::ToolUse {
            text: Vec::new(),
            requests: requests
                .into_iter()
                .map(|(call_id, name, args)| ToolUseRequest {
                    id: call_id.to_string(),
                    name: name.to_string(),
                    arguments: args.as_object().cloned().unwrap_or_default(),
                })
                .collect(),
        },
    }
}

fn final_turn(id: &str, text: &[&str]) -> ModelTurn {
    ModelTurn {
        id: id.to_string(),
        reply: ModelReply::Final {
            text: text.iter().map(|s| s.to_string()).collect(),
        },
    }
}

fn catalog() -> Vec<ToolSchema> {
    vec![
        ToolSchema::new("get_database_schema"),
        ToolSchema::new("execute_query").with_input_schema(json!({
            "type": "object",
            "properties": {"sql_query": {"type": "string"}},
            "required": ["sql_query"]
        })),
    ]
}

#[tokio::test]
async fn test_single_tool_call_then_answer() {
    let backend = ScriptedBackend::new(vec![
        Ok(tool_use(
            "r1",
            vec![(
                "c1",
                "execute_query",
                json!({"sql_query": "SELECT rate FROM readmissions.summary"}),
            )],
        )),
        Ok(final_turn("r2", &["The rate is 5%."])),
    ]);
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), LoopOptions::default());

    let response = engine
        .run("What is the readmission rate?", &catalog())
        .await
        .unwrap();

    assert_eq!(response.response_text, "The rate is 5%.");
    assert_eq!(response.tool_calls.len(), 1);
    assert!(response.error.is_none());
    assert_eq!(response.model, "scripted-model");
    assert_eq!(response.session_id, "r2");
    assert_eq!(response.query, "What is the readmission rate?");

    let event = &response.tool_calls[0];
    assert_eq!(event.tool_name, "execute_query");
    assert_eq!(event.model, "scripted-model");
    assert_eq!(
        event.arguments["sql_query"],
        "SELECT rate FROM readmissions.summary"
    );

    // Second request carries the assistant turn and the tool result.
    let transcripts = engine.backend().transcripts();
    assert_eq!(transcripts.len(), 2);
    let second = &transcripts[1];
    assert_eq!(second.len(), 3);
    assert!(matches!(&second[1], Message::Assistant { tool_uses, .. } if tool_uses.len() == 1));
    match &second[2] {
        Message::ToolResult {
            call_id,
            content,
            is_error,
            ..
        } => {
            assert_eq!(call_id, "c1");
            assert!(content.contains("rate"));
            assert!(!is_error);
        }
        other => panic!("expected tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failing_tool_is_recorded_and_reported_to_model() {
    let backend = ScriptedBackend::new(vec![
        Ok(tool_use(
            "r1",
            vec![(
                "c1",
                "execute_query",
                json!({"sql_query": "SELECT * FROM wrong_table"}),
            )],
        )),
        Ok(tool_use(
            "r2",
            vec![(
                "c2",
                "execute_query",
                json!({"sql_query": "SELECT rate FROM readmissions.summary"}),
            )],
        )),
        Ok(final_turn("r3", &["Recovered:", "5%."])),
    ]);
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), LoopOptions::default());

    let response = engine.run("Rate?", &catalog()).await.unwrap();

    assert!(response.error.is_none());
    assert_eq!(response.response_text, "Recovered: 5%.");
    assert_eq!(response.tool_calls.len(), 2);
    assert_eq!(
        response.tool_calls[0].arguments["sql_query"],
        "SELECT * FROM wrong_table"
    );
    assert!(response.tool_calls[0].latency_ms >= 3);

    let transcripts = engine.backend().transcripts();
    match &transcripts[1][2] {
        Message::ToolResult {
            content, is_error, ..
        } => {
            assert!(*is_error);
            assert_eq!(content, "Error: no such table: main.wrong_table");
        }
        other => panic!("expected tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn test_multiple_requests_run_in_order() {
    let backend = ScriptedBackend::new(vec![
        Ok(tool_use(
            "r1",
            vec![
                ("c1", "get_database_schema", json!({})),
                ("c2", "execute_query", json!({"sql_query": "SELECT 1"})),
                ("c3", "get_table_info", json!({"table_name": "x"})),
            ],
        )),
        Ok(final_turn("r2", &["done"])),
    ]);
    let tools = ScriptedTools::new();
    let engine = ConversationEngine::new(backend, tools, LoopOptions::default());

    let response = engine.run("Explore", &catalog()).await.unwrap();

    let names: Vec<&str> = response
        .tool_calls
        .iter()
        .map(|c| c.tool_name.as_str())
        .collect();
    assert_eq!(names, vec!["get_database_schema", "execute_query", "get_table_info"]);
    assert_eq!(
        response.tool_names(),
        "get_database_schema; execute_query; get_table_info"
    );

    let transcripts = engine.backend().transcripts();
    let results: Vec<&str> = transcripts[1]
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(results, vec!["c1", "c2", "c3"]);

    let executed = engine.into_executor().call_log();
    assert_eq!(executed, vec!["get_database_schema", "execute_query", "get_table_info"]);
}

#[tokio::test]
async fn test_total_latency_covers_tool_calls() {
    let backend = ScriptedBackend::new(vec![
        Ok(tool_use(
            "r1",
            vec![
                ("c1", "get_database_schema", json!({})),
                ("c2", "execute_query", json!({"sql_query": "SELECT 1"})),
            ],
        )),
        Ok(final_turn("r2", &["ok"])),
    ]);
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), LoopOptions::default());
    let response = engine.run("q", &catalog()).await.unwrap();

    let tool_total: u64 = response.tool_calls.iter().map(|c| c.latency_ms).sum();
    assert!(response.total_latency_ms >= tool_total);
    assert!(response.total_latency_ms >= 4, "two model turns of 2ms each");
}

#[tokio::test]
async fn test_tool_use_without_requests_is_final() {
    let backend = ScriptedBackend::new(vec![Ok(ModelTurn {
        id: "r1".to_string(),
        reply: ModelReply::ToolUse {
            text: vec!["Nothing to run.".to_string()],
            requests: Vec::new(),
        },
    })]);
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), LoopOptions::default());
    let response = engine.run("q", &catalog()).await.unwrap();
    assert_eq!(response.response_text, "Nothing to run.");
    assert!(response.tool_calls.is_empty());
}

#[tokio::test]
async fn test_max_turns_returns_partial_response() {
    let backend = ScriptedBackend::looping(tool_use(
        "r",
        vec![("c", "get_database_schema", json!({}))],
    ));
    let options = LoopOptions {
        max_turns: 3,
        tool_policy: None,
    };
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), options);

    let response = engine.run("Loop forever", &catalog()).await.unwrap();

    assert_eq!(response.error.as_deref(), Some("Maximum turns (3) exceeded"));
    assert_eq!(response.response_text, "");
    assert_eq!(response.tool_calls.len(), 3);
    assert_eq!(engine.backend().transcripts().len(), 3);
}

#[tokio::test]
async fn test_model_failure_returns_run_error_with_partial_calls() {
    let backend = ScriptedBackend::new(vec![
        Ok(tool_use(
            "r1",
            vec![("c1", "get_database_schema", json!({}))],
        )),
        Err(BackendError::Status {
            provider: "scripted",
            status: 529,
            body: "overloaded".to_string(),
        }),
    ]);
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), LoopOptions::default());

    let err = engine.run("q", &catalog()).await.unwrap_err();

    assert_eq!(err.model, "scripted-model");
    assert_eq!(err.query, "q");
    assert_eq!(err.session_id, "r1", "id of the last turn that succeeded");
    assert_eq!(err.tool_calls.len(), 1);
    assert!(matches!(err.source, BackendError::Status { status: 529, .. }));
}

#[tokio::test]
async fn test_tool_policy_is_sent_but_not_recorded() {
    let backend = ScriptedBackend::new(vec![Ok(final_turn("r1", &["answer"]))]);
    let options = LoopOptions {
        max_turns: 5,
        tool_policy: Some("Always call get_database_schema first.".to_string()),
    };
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), options);

    let response = engine.run("How many patients?", &catalog()).await.unwrap();
    assert_eq!(response.query, "How many patients?");

    let transcripts = engine.backend().transcripts();
    assert_eq!(
        transcripts[0][0],
        Message::user("Always call get_database_schema first.\n\nHow many patients?")
    );
}

#[tokio::test]
async fn test_empty_catalog_still_runs() {
    let backend = ScriptedBackend::new(vec![Ok(final_turn("r1", &["no tools needed"]))]);
    let engine = ConversationEngine::new(backend, ScriptedTools::new(), LoopOptions::default());
    let response = engine.run("Hello", &[]).await.unwrap();
    assert_eq!(response.response_text, "no tools needed");
}
