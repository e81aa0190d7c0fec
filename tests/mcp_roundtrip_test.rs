//! End-to-end tests of the MCP surface through an in-process client session.

use osler_mcp::bench::{JsonObject, McpToolExecutor, ToolExecutor};
use osler_mcp::db::SqliteStore;
use osler_mcp::error::ToolError;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

async fn connect() -> McpToolExecutor {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for sql in [
        "ATTACH DATABASE ':memory:' AS readmissions",
        "CREATE TABLE readmissions.readmission_summary (\
            encounter_id TEXT, index_admission_flag INTEGER, unplanned_readmit_30_flag INTEGER)",
        "INSERT INTO readmissions.readmission_summary VALUES ('e1', 1, 1), ('e2', 1, 0)",
    ] {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    let store = Arc::new(SqliteStore::from_pool(pool, Duration::from_secs(5)));
    McpToolExecutor::connect_in_process(store, 50).await.unwrap()
}

fn args(value: serde_json::Value) -> JsonObject {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_catalog_lists_every_tool_with_schema() {
    let executor = connect().await;
    let tools = executor.list_tools().await.unwrap();

    let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "execute_query",
            "get_average_cms_hcc_risk_score",
            "get_database_schema",
            "get_overall_readmission_rate",
            "get_table_info",
        ]
    );

    let execute = tools.iter().find(|t| t.name == "execute_query").unwrap();
    assert!(execute.description.as_deref().unwrap_or("").contains("SELECT"));
    let schema = execute.input_schema.as_ref().unwrap();
    assert!(schema["properties"]["sql_query"].is_object(), "{schema}");

    executor.close().await;
}

#[tokio::test]
async fn test_execute_query_over_mcp() {
    let executor = connect().await;

    let output = executor
        .execute(
            "execute_query",
            &args(json!({"sql_query": "SELECT COUNT(*) AS n FROM readmissions.readmission_summary"})),
        )
        .await
        .unwrap();
    assert!(output.contains("| n |"), "{output}");
    assert!(output.contains("| 2 |"), "{output}");

    let blocked = executor
        .execute(
            "execute_query",
            &args(json!({"sql_query": "DELETE FROM readmissions.readmission_summary"})),
        )
        .await
        .unwrap();
    assert!(blocked.contains("Only SELECT queries allowed"), "{blocked}");

    executor.close().await;
}

#[tokio::test]
async fn test_metric_tool_over_mcp() {
    let executor = connect().await;
    let output = executor
        .execute("get_overall_readmission_rate", &JsonObject::new())
        .await
        .unwrap();
    assert!(output.contains("50.00%"), "{output}");
    executor.close().await;
}

#[tokio::test]
async fn test_unknown_tool_is_an_error() {
    let executor = connect().await;
    let result = executor.execute("drop_everything", &JsonObject::new()).await;
    assert!(
        matches!(result, Err(ToolError::Transport(_) | ToolError::Reported(_))),
        "{result:?}"
    );
    executor.close().await;
}

#[tokio::test]
async fn test_missing_argument_is_an_error() {
    let executor = connect().await;
    let result = executor.execute("execute_query", &JsonObject::new()).await;
    assert!(result.is_err(), "{result:?}");
    executor.close().await;
}
