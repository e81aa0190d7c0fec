//! Batch driver: questions from a CSV in, one result row per question out.

use crate::bench::backend::ModelBackend;
use crate::bench::bridge::ToolExecutor;
use crate::bench::engine::ConversationEngine;
use crate::bench::schema::{ModelResponse, ToolSchema};
use crate::config::OnError;
use crate::error::BenchError;
use csv::{StringRecord, Writer};
use futures_util::{StreamExt, stream};
use std::fs::File;
use std::path::Path;
use tracing::{error, info};

/// Columns appended to every input row.
pub const RESULT_COLUMNS: [&str; 6] = [
    "model",
    "session_id",
    "tool_calls",
    "tool_arguments",
    "response_text",
    "total_runtime_s",
];

/// Questions read from the input CSV.
#[derive(Debug, Clone)]
pub struct QueryBatch {
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
    query_index: usize,
}

impl QueryBatch {
    pub fn from_path(path: &Path, query_column: &str) -> Result<Self, BenchError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let query_index = headers
            .iter()
            .position(|h| h.trim() == query_column)
            .ok_or_else(|| BenchError::MissingColumn(query_column.to_string()))?;
        let records = reader.records().collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            headers,
            records,
            query_index,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn query(&self, index: usize) -> &str {
        self.records
            .get(index)
            .and_then(|r| r.get(self.query_index))
            .unwrap_or_default()
    }
}

/// Output CSV written one row at a time, flushed after each row.
pub struct CsvSink {
    writer: Writer<File>,
}

impl CsvSink {
    /// Create the file and write the header row.
    pub fn create(path: &Path, input_headers: &StringRecord) -> Result<Self, BenchError> {
        let mut writer = Writer::from_path(path)?;
        let mut header = input_headers.clone();
        for column in RESULT_COLUMNS {
            header.push_field(column);
        }
        writer.write_record(&header)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, input: &StringRecord, response: &ModelResponse) -> Result<(), BenchError> {
        let mut row = input.clone();
        row.push_field(&response.model);
        row.push_field(&response.session_id);
        row.push_field(&response.tool_names());
        row.push_field(&response.tool_arguments());
        row.push_field(&response.response_text);
        row.push_field(&response.total_runtime_s().to_string());
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Run every question in `batch` and stream results into `sink` in input order.
///
/// Up to `concurrency` runs are in flight at once; each run is independent
/// and shares only the read-only catalog.
pub async fn run_benchmark<B, X>(
    engine: &ConversationEngine<B, X>,
    tools: &[ToolSchema],
    batch: &QueryBatch,
    sink: &mut CsvSink,
    concurrency: usize,
    on_error: OnError,
) -> Result<BenchSummary, BenchError>
where
    B: ModelBackend,
    X: ToolExecutor,
{
    let total = batch.len();
    let mut summary = BenchSummary::default();

    let mut runs = stream::iter((0..total).map(|index| async move {
        let outcome = engine.run(batch.query(index), tools).await;
        (index, outcome)
    }))
    .buffered(concurrency.max(1));

    while let Some((index, outcome)) = runs.next().await {
        let record = &batch.records[index];
        match outcome {
            Ok(response) => {
                if response.is_error() {
                    summary.failed += 1;
                } else {
                    summary.completed += 1;
                }
                info!(
                    query_index = index + 1,
                    total,
                    tool_calls = response.tool_calls.len(),
                    runtime_s = response.total_runtime_s(),
                    "Query finished"
                );
                sink.write(record, &response)?;
            }
            Err(err) => {
                error!(query_index = index + 1, total, error = %err, "Query failed");
                match on_error {
                    OnError::Record => {
                        summary.failed += 1;
                        sink.write(record, &ModelResponse::from(err))?;
                    }
                    OnError::Skip => summary.skipped += 1,
                    OnError::Abort => return Err(BenchError::Aborted(err)),
                }
            }
        }
    }

    info!(
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Benchmark finished"
    );
    Ok(summary)
}
