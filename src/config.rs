//! Configuration handling for the Osler MCP server and the benchmark driver.
//!
//! Both binaries take their configuration from CLI arguments with environment
//! variable fallbacks.

use crate::auth::OAuth2Config;
use crate::db::Attachment;
use clap::builder::RangedU64ValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATABASE_PATH: &str = "osler_data/databases/tuva_project_demo.sqlite";
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ROWS: usize = 50;
pub const DEFAULT_REQUIRED_SCOPES: &str = "read:mimic-data";
pub const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 3600;

// Benchmark defaults
pub const DEFAULT_MAX_TURNS: usize = 25;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_QUERY_COLUMN: &str = "Query";
pub const LOCAL_OPENAI_BASE_URL: &str = "http://localhost:11434/v1";

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the Osler MCP server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "osler-mcp",
    about = "MCP server exposing guarded read-only SQL tools over an analytical healthcare database",
    version,
    author
)]
pub struct ServerConfig {
    /// Path to the analytical SQLite database (or a sqlite: URL).
    #[arg(
        short = 'd',
        long = "database",
        value_name = "PATH",
        default_value = DEFAULT_DATABASE_PATH,
        env = "OSLER_DB_PATH"
    )]
    pub database: String,

    /// Extra databases attached as schemas, as schema=path.
    /// Can be specified multiple times or as comma-separated values.
    #[arg(
        long = "attach",
        value_name = "SCHEMA=PATH",
        env = "OSLER_ATTACH",
        value_delimiter = ','
    )]
    pub attach: Vec<String>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "OSLER_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "OSLER_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "OSLER_HTTP_PORT")]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(long, default_value = DEFAULT_MCP_ENDPOINT, env = "OSLER_MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "OSLER_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Maximum number of rows rendered in a query result
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS, env = "OSLER_MAX_ROWS")]
    pub max_rows: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "OSLER_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "OSLER_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (stdio transport stays silent otherwise)
    #[arg(long, env = "OSLER_ENABLE_LOGS")]
    pub enable_logs: bool,

    /// Require OAuth2 bearer tokens
    #[arg(long, env = "OSLER_OAUTH2_ENABLED")]
    pub oauth2_enabled: bool,

    /// Expected token issuer
    #[arg(long, env = "OSLER_OAUTH2_ISSUER_URL")]
    pub oauth2_issuer_url: Option<String>,

    /// Expected token audience
    #[arg(long, env = "OSLER_OAUTH2_AUDIENCE")]
    pub oauth2_audience: Option<String>,

    /// JWKS endpoint (defaults to <issuer>/.well-known/jwks.json)
    #[arg(long, env = "OSLER_OAUTH2_JWKS_URL")]
    pub oauth2_jwks_url: Option<String>,

    /// Seconds a fetched JWKS is reused before it is fetched again
    #[arg(long, default_value_t = DEFAULT_JWKS_CACHE_TTL_SECS, env = "OSLER_OAUTH2_JWKS_CACHE_TTL")]
    pub oauth2_jwks_cache_ttl: u64,

    /// Space or comma separated scopes every token must carry
    #[arg(
        long,
        default_value = DEFAULT_REQUIRED_SCOPES,
        env = "OSLER_OAUTH2_REQUIRED_SCOPES"
    )]
    pub oauth2_required_scopes: String,

    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "OSLER_OAUTH2_VALIDATE_EXP")]
    pub oauth2_validate_exp: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "OSLER_OAUTH2_VALIDATE_AUD")]
    pub oauth2_validate_aud: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "OSLER_OAUTH2_VALIDATE_ISS")]
    pub oauth2_validate_iss: bool,

    /// Bearer token checked once at startup for the stdio transport
    #[arg(long, env = "OSLER_OAUTH2_TOKEN", hide_env_values = true)]
    pub oauth2_token: Option<String>,
}

impl ServerConfig {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            database: DEFAULT_DATABASE_PATH.to_string(),
            attach: Vec::new(),
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            max_rows: DEFAULT_MAX_ROWS,
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
            oauth2_enabled: false,
            oauth2_issuer_url: None,
            oauth2_audience: None,
            oauth2_jwks_url: None,
            oauth2_jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL_SECS,
            oauth2_required_scopes: DEFAULT_REQUIRED_SCOPES.to_string(),
            oauth2_validate_exp: true,
            oauth2_validate_aud: true,
            oauth2_validate_iss: true,
            oauth2_token: None,
        }
    }

    /// Parse all `--attach` entries.
    pub fn attachments(&self) -> Result<Vec<Attachment>, String> {
        parse_attachments(&self.attach)
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// Build the OAuth2 settings, validating required fields when enabled.
    pub fn oauth2(&self) -> Result<OAuth2Config, String> {
        if !self.oauth2_enabled {
            return Ok(OAuth2Config::disabled());
        }

        let issuer = self
            .oauth2_issuer_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or("OSLER_OAUTH2_ISSUER_URL is required when OAuth2 is enabled")?;
        let audience = self
            .oauth2_audience
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or("OSLER_OAUTH2_AUDIENCE is required when OAuth2 is enabled")?;

        let jwks_url = match self.oauth2_jwks_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/')),
        };
        url::Url::parse(&jwks_url).map_err(|e| format!("Invalid JWKS URL '{jwks_url}': {e}"))?;

        let required_scopes = self
            .oauth2_required_scopes
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(OAuth2Config {
            enabled: true,
            issuer_url: issuer.to_string(),
            audience: audience.to_string(),
            jwks_url,
            jwks_cache_ttl: Duration::from_secs(self.oauth2_jwks_cache_ttl),
            required_scopes,
            validate_exp: self.oauth2_validate_exp,
            validate_aud: self.oauth2_validate_aud,
            validate_iss: self.oauth2_validate_iss,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Model provider family used by the benchmark driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Chat Completions
    Openai,
    /// GPT-OSS served by a local OpenAI-compatible server
    #[value(name = "openai-oss")]
    OpenaiOss,
    /// Qwen served by a local OpenAI-compatible server
    Qwen,
}

impl ProviderKind {
    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Openai => "OPENAI_API_KEY",
            Self::OpenaiOss => "GPT_OSS_API_KEY",
            Self::Qwen => "QWEN_API_KEY",
        }
    }

    /// Placeholder key accepted by local servers when none is configured.
    pub fn fallback_api_key(&self) -> Option<&'static str> {
        match self {
            Self::OpenaiOss => Some("ollama"),
            Self::Qwen => Some("qwen"),
            Self::Anthropic | Self::Openai => None,
        }
    }

    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Self::Openai => Some("gpt-4-turbo"),
            Self::OpenaiOss => Some("gpt-oss-20b-ctx32k:latest"),
            Self::Anthropic | Self::Qwen => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::Openai => "https://api.openai.com/v1",
            Self::OpenaiOss | Self::Qwen => LOCAL_OPENAI_BASE_URL,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::Openai => write!(f, "openai"),
            Self::OpenaiOss => write!(f, "openai-oss"),
            Self::Qwen => write!(f, "qwen"),
        }
    }
}

/// What the driver does with a run that failed fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OnError {
    /// Write a row with the error recorded and an empty response
    #[default]
    Record,
    /// Log the failure and write nothing for that query
    Skip,
    /// Stop the whole batch
    Abort,
}

/// Configuration for the benchmark driver.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "osler-bench",
    about = "Run a CSV of natural-language questions through a model with the Osler MCP tools",
    version,
    author
)]
pub struct BenchConfig {
    /// Model provider
    #[arg(short, long, value_enum, env = "OSLER_BENCH_PROVIDER")]
    pub provider: ProviderKind,

    /// Model identifier (provider default when omitted)
    #[arg(short, long, env = "OSLER_BENCH_MODEL")]
    pub model: Option<String>,

    /// API key (falls back to the provider's environment variable)
    #[arg(long, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the provider base URL
    #[arg(long, env = "OSLER_BENCH_BASE_URL")]
    pub base_url: Option<String>,

    /// Input CSV with one question per row
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    /// Output CSV (defaults to output_<input file name> next to the input)
    #[arg(short, long, value_name = "CSV")]
    pub output: Option<PathBuf>,

    /// Column holding the question text
    #[arg(long, default_value = DEFAULT_QUERY_COLUMN)]
    pub query_column: String,

    /// Path to the analytical SQLite database served to the model
    #[arg(
        short = 'd',
        long = "database",
        value_name = "PATH",
        default_value = DEFAULT_DATABASE_PATH,
        env = "OSLER_DB_PATH"
    )]
    pub database: String,

    /// Extra databases attached as schemas, as schema=path.
    /// Can be specified multiple times or as comma-separated values.
    #[arg(
        long = "attach",
        value_name = "SCHEMA=PATH",
        env = "OSLER_ATTACH",
        value_delimiter = ','
    )]
    pub attach: Vec<String>,

    /// Maximum model turns per question
    #[arg(long, default_value_t = DEFAULT_MAX_TURNS, value_parser = at_least_one())]
    pub max_turns: usize,

    /// max_tokens sent with every model request
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Per-request timeout in seconds; must outlast the longest tool-calling session
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Text prepended to every prompt before it is sent
    #[arg(long)]
    pub tool_policy: Option<String>,

    /// Number of questions run at the same time
    #[arg(long, default_value_t = 1, value_parser = at_least_one())]
    pub concurrency: usize,

    /// Behaviour when a run fails fatally
    #[arg(long, value_enum, default_value = "record")]
    pub on_error: OnError,

    /// Query timeout in seconds for the embedded MCP server
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_SECS)]
    pub query_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "OSLER_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "OSLER_JSON_LOGS")]
    pub json_logs: bool,
}

impl BenchConfig {
    /// Resolve the model id, falling back to the provider preset.
    pub fn resolved_model(&self) -> Option<String> {
        self.model
            .clone()
            .or_else(|| self.provider.default_model().map(String::from))
    }

    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    /// Resolve the API key: explicit flag, then provider env var, then local placeholder.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(self.provider.api_key_env()).ok())
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.provider.fallback_api_key().map(String::from))
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => default_output_path(&self.input),
        }
    }

    pub fn attachments(&self) -> Result<Vec<Attachment>, String> {
        parse_attachments(&self.attach)
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Counts that make no sense as zero (turns, parallel runs).
fn at_least_one() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::<usize>::new().range(1..)
}

fn parse_attachments(entries: &[String]) -> Result<Vec<Attachment>, String> {
    entries
        .iter()
        .filter(|e| !e.trim().is_empty())
        .map(|e| Attachment::parse(e))
        .collect()
}

/// `dir/questions.csv` becomes `dir/output_questions.csv`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results.csv".to_string());
    input.with_file_name(format!("output_{name}"))
}
