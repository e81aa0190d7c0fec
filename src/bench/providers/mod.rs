//! Model provider backends.
//!
//! - `anthropic`: Anthropic Messages API
//! - `openai`: OpenAI Chat Completions, also used for local OpenAI-compatible servers

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

use crate::config::{BenchConfig, ProviderKind};
use crate::error::BackendError;
use serde_json::Value as JsonValue;
use tracing::debug;

/// A backend selected from the command line.
pub enum Backend {
    Anthropic(AnthropicBackend),
    OpenAi(OpenAiBackend),
}

impl Backend {
    pub fn from_config(config: &BenchConfig) -> Result<Self, BackendError> {
        let model = config.resolved_model().ok_or_else(|| {
            BackendError::config(format!(
                "--model is required for provider '{}'",
                config.provider
            ))
        })?;
        let api_key = config.resolved_api_key().ok_or_else(|| {
            BackendError::config(format!(
                "No API key: pass --api-key or set {}",
                config.provider.api_key_env()
            ))
        })?;
        let base_url = config.resolved_base_url();
        let timeout = config.request_timeout_duration();

        let backend = match config.provider {
            ProviderKind::Anthropic => Self::Anthropic(AnthropicBackend::new(
                &api_key,
                model,
                base_url,
                config.max_tokens,
                timeout,
            )?),
            ProviderKind::Openai | ProviderKind::OpenaiOss | ProviderKind::Qwen => {
                Self::OpenAi(OpenAiBackend::new(&api_key, model, base_url, timeout)?)
            }
        };
        Ok(backend)
    }
}

/// POST a JSON body and return the raw response text of a 2xx reply.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    provider: &'static str,
    url: &str,
    body: &JsonValue,
) -> Result<String, BackendError> {
    debug!(provider, url, "Sending model request");

    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| BackendError::http(provider, e.to_string()))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| BackendError::http(provider, e.to_string()))?;

    if !status.is_success() {
        return Err(BackendError::Status {
            provider,
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}
