//! Analytical store access.
//!
//! The store is a read-only SQLite database. Additional databases can be
//! attached under a schema name so that tables are addressed as
//! `schema.table`, mirroring how the clinical marts are organised.

use crate::db::types::RowToJson;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    ColumnDefinition, QueryResult, TableDescription, TableInfo, TableRef, TableType,
};
use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Row, SqlitePool};
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info};

/// Rows returned when describing a table with samples.
pub const SAMPLE_ROWS: usize = 3;

/// Capabilities the query tools need from an analytical backend.
pub trait AnalyticsStore: Send + Sync {
    /// Run a read query, decoding at most `row_cap` rows while counting all of them.
    fn execute_query(
        &self,
        sql: &str,
        row_cap: usize,
    ) -> impl Future<Output = StoreResult<QueryResult>> + Send;

    /// Names of all attached schemas.
    fn list_schemas(&self) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    /// Tables and views in one schema.
    fn list_tables(
        &self,
        schema: &str,
    ) -> impl Future<Output = StoreResult<Vec<TableInfo>>> + Send;

    /// Column metadata plus optional sample rows.
    fn describe(
        &self,
        table: &TableRef,
        with_sample: bool,
    ) -> impl Future<Output = StoreResult<TableDescription>> + Send;
}

/// A database file attached under its own schema name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub schema: String,
    pub path: PathBuf,
}

impl Attachment {
    /// Parse `schema=path/to/file.sqlite`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (schema, path) = s
            .split_once('=')
            .ok_or_else(|| format!("Invalid attachment '{s}': expected schema=path"))?;
        let schema = schema.trim();
        if !crate::models::schema::is_identifier(schema) {
            return Err(format!(
                "Invalid attachment schema '{schema}': use letters, digits and underscores"
            ));
        }
        if path.trim().is_empty() || path.contains('\'') {
            return Err(format!("Invalid attachment path for schema '{schema}'"));
        }
        Ok(Self {
            schema: schema.to_string(),
            path: PathBuf::from(path.trim()),
        })
    }
}

/// SQLite-backed analytical store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open `database` (a file path or `sqlite:` URL) read-only.
    pub async fn open(
        database: &str,
        attachments: &[Attachment],
        query_timeout: Duration,
    ) -> StoreResult<Self> {
        let url = if database.starts_with("sqlite:") {
            database.to_string()
        } else {
            format!("sqlite:{database}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| {
                StoreError::connection(
                    format!("Invalid SQLite database path: {}", e),
                    "Pass a file path or a URL of the form sqlite:path/to/db.sqlite",
                )
            })?
            .read_only(true);

        let attach_sql: Vec<String> = attachments
            .iter()
            .map(|a| {
                format!(
                    "ATTACH DATABASE '{}' AS \"{}\"",
                    a.path.display(),
                    a.schema
                )
            })
            .collect();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .after_connect(move |conn, _meta| {
                let attach_sql = attach_sql.clone();
                Box::pin(async move {
                    for sql in &attach_sql {
                        conn.execute(sql.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::connection(
                    format!("Failed to open analytical database: {}", e),
                    "Check that the database file exists and is readable",
                )
            })?;

        info!(
            database = %database,
            attachments = attachments.len(),
            "Analytical store opened"
        );

        Ok(Self::from_pool(pool, query_timeout))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_all_rows(&self, sql: &str, operation: &str) -> StoreResult<QueryResult> {
        self.fetch_rows(sql, usize::MAX, operation).await
    }

    async fn fetch_rows(
        &self,
        sql: &str,
        row_cap: usize,
        operation: &str,
    ) -> StoreResult<QueryResult> {
        let start = Instant::now();
        let collect = async {
            let mut stream = self.pool.fetch(sql);
            let mut result = QueryResult::default();
            while let Some(row) = stream.try_next().await? {
                if result.total_rows == 0 {
                    result.columns = row.column_metadata();
                }
                if result.rows.len() < row_cap {
                    result.rows.push(row.to_json_map());
                }
                result.total_rows += 1;
            }
            Ok::<_, sqlx::Error>(result)
        };

        let mut result = match timeout(self.query_timeout, collect).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(StoreError::from(e)),
            Err(_) => {
                return Err(StoreError::timeout(
                    operation,
                    self.query_timeout.as_secs(),
                ));
            }
        };

        result.truncated = result.total_rows > result.rows.len();
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            operation,
            rows = result.total_rows,
            elapsed_ms = result.execution_time_ms,
            "Query finished"
        );
        Ok(result)
    }
}

impl AnalyticsStore for SqliteStore {
    async fn execute_query(&self, sql: &str, row_cap: usize) -> StoreResult<QueryResult> {
        self.fetch_rows(sql, row_cap, "query execution").await
    }

    async fn list_schemas(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("PRAGMA database_list")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(StoreError::from))
            .filter(|name| !matches!(name, Ok(n) if n == "temp"))
            .collect()
    }

    async fn list_tables(&self, schema: &str) -> StoreResult<Vec<TableInfo>> {
        if !crate::models::schema::is_identifier(schema) {
            return Err(StoreError::invalid_input(format!(
                "Invalid schema name '{schema}'"
            )));
        }

        let sql = format!(
            "SELECT name, type FROM \"{schema}\".sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(TableInfo {
                    schema: schema.to_string(),
                    name: row.try_get("name")?,
                    table_type: TableType::from_sqlite(row.try_get::<&str, _>("type")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    async fn describe(&self, table: &TableRef, with_sample: bool) -> StoreResult<TableDescription> {
        let sql = format!(
            "PRAGMA \"{}\".table_info(\"{}\")",
            table.schema, table.name
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        if rows.is_empty() {
            return Err(StoreError::schema(
                format!("Table not found: {table}"),
                table.to_string(),
            ));
        }

        let columns = rows
            .iter()
            .map(|row| {
                Ok(ColumnDefinition {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    nullable: row.try_get::<i64, _>("notnull")? == 0,
                    default_value: row.try_get("dflt_value")?,
                    primary_key: row.try_get::<i64, _>("pk")? > 0,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let sample = if with_sample {
            let sample_sql = format!("SELECT * FROM {} LIMIT {}", table.quoted(), SAMPLE_ROWS);
            Some(self.fetch_all_rows(&sample_sql, "table sample").await?)
        } else {
            None
        };

        Ok(TableDescription {
            table: table.clone(),
            columns,
            sample,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_parse() {
        let a = Attachment::parse("readmissions=data/readmissions.sqlite").unwrap();
        assert_eq!(a.schema, "readmissions");
        assert_eq!(a.path, PathBuf::from("data/readmissions.sqlite"));
    }

    #[test]
    fn test_attachment_parse_rejects_bad_input() {
        assert!(Attachment::parse("no-equals-sign").is_err());
        assert!(Attachment::parse("bad name=x.sqlite").is_err());
        assert!(Attachment::parse("core=it's.sqlite").is_err());
        assert!(Attachment::parse("core=").is_err());
    }
}
