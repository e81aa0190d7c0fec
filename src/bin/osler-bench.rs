//! Osler benchmark driver.
//!
//! Runs every question of an input CSV through one model with the Osler MCP
//! tools attached and writes one result row per question.

use clap::Parser;
use osler_mcp::bench::providers::Backend;
use osler_mcp::bench::{
    BenchSummary, ConversationEngine, CsvSink, LoopOptions, McpToolExecutor, ModelBackend,
    QueryBatch, ToolSchema, run_benchmark,
};
use osler_mcp::config::{BenchConfig, DEFAULT_MAX_ROWS};
use osler_mcp::db::SqliteStore;
use osler_mcp::error::BenchError;
use osler_mcp::logging::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BenchConfig::parse();
    init_tracing(&config.log_level, config.json_logs);

    let backend = Backend::from_config(&config)?;
    let output = config.output_path();
    let batch = QueryBatch::from_path(&config.input, &config.query_column)?;
    info!(
        provider = %config.provider,
        input = %config.input.display(),
        output = %output.display(),
        queries = batch.len(),
        "Starting benchmark"
    );

    let attachments = config.attachments()?;
    let store = Arc::new(
        SqliteStore::open(
            &config.database,
            &attachments,
            Duration::from_secs(config.query_timeout),
        )
        .await?,
    );

    let executor = McpToolExecutor::connect_in_process(store.clone(), DEFAULT_MAX_ROWS).await?;
    let tools = executor.list_tools().await?;
    let mut sink = CsvSink::create(&output, &batch.headers)?;

    let options = LoopOptions {
        max_turns: config.max_turns,
        tool_policy: config.tool_policy.clone(),
    };

    let result = match backend {
        Backend::Anthropic(backend) => {
            let engine = ConversationEngine::new(backend, executor, options);
            drive(engine, &tools, &batch, &mut sink, &config).await
        }
        Backend::OpenAi(backend) => {
            let engine = ConversationEngine::new(backend, executor, options);
            drive(engine, &tools, &batch, &mut sink, &config).await
        }
    };

    store.close().await;

    match result {
        Ok(summary) => {
            info!(
                completed = summary.completed,
                failed = summary.failed,
                skipped = summary.skipped,
                output = %output.display(),
                "Results written"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Benchmark failed");
            Err(e.into())
        }
    }
}

async fn drive<B: ModelBackend>(
    engine: ConversationEngine<B, McpToolExecutor>,
    tools: &[ToolSchema],
    batch: &QueryBatch,
    sink: &mut CsvSink,
    config: &BenchConfig,
) -> Result<BenchSummary, BenchError> {
    info!(
        provider = engine.backend().provider(),
        model = engine.backend().model(),
        tools = tools.len(),
        "Model backend ready"
    );
    let result = run_benchmark(
        &engine,
        tools,
        batch,
        sink,
        config.concurrency,
        config.on_error,
    )
    .await;
    engine.into_executor().close().await;
    result
}
