use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

use super::backend::{BackendError, CompletionBackend, CompletionOptions, Prompt};
use crate::config::{env_string, env_u64};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

impl From<LlmError> for BackendError {
    fn from(err: LlmError) -> Self {
        match &err {
            LlmError::Request(_) => Self::Transient(err.to_string()),
            LlmError::HttpStatus { status, .. } if is_retryable(*status) => {
                Self::Transient(err.to_string())
            }
            LlmError::NotConfigured(_)
            | LlmError::HttpStatus { .. }
            | LlmError::Json(_)
            | LlmError::EmptyChoices => Self::Content(err.to_string()),
        }
    }
}

/// OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct LlmProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmProvider {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        let api_key = env_string("LLM_API_KEY");
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("LLM_API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout = Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));

        Self::new(LlmConfig {
            api_key,
            model,
            api_endpoint,
            timeout,
        })
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, prompt: &Prompt, options: &CompletionOptions) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::NotConfigured("LLM_API_KEY"))?;

        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let messages = [
            ChatMessage {
                role: "system".into(),
                content: prompt.system.clone(),
            },
            ChatMessage {
                role: "user".into(),
                content: prompt.user.clone(),
            },
        ];
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": false
        });

        let response = self.post_with_retry(&url, api_key, &payload).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyChoices)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for retry in 0..=MAX_RETRIES {
            let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
            match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(|e| {
                            error!(error = %e, body_len = bytes.len(), "failed to parse completion response");
                            LlmError::Json(e)
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = LlmError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        warn!(retry, ?status, "completion request failed, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = LlmError::Request(e);
                    if retry < MAX_RETRIES {
                        warn!(retry, "completion request error, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(LlmError::NotConfigured("unknown")))
    }
}

#[async_trait]
impl CompletionBackend for LlmProvider {
    async fn complete(&self, prompt: &Prompt, options: &CompletionOptions) -> Result<String, BackendError> {
        self.chat(prompt, options).await.map_err(BackendError::from)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_gets_version_suffix() {
        assert_eq!(normalize_endpoint("https://host/".into()), "https://host/v1");
        assert_eq!(normalize_endpoint("https://host/v1".into()), "https://host/v1");
    }

    #[test]
    fn error_mapping_separates_transient_failures() {
        let throttled = LlmError::HttpStatus {
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        assert!(matches!(BackendError::from(throttled), BackendError::Transient(_)));

        let rejected = LlmError::HttpStatus {
            status: reqwest::StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(matches!(BackendError::from(rejected), BackendError::Content(_)));
        assert!(matches!(
            BackendError::from(LlmError::EmptyChoices),
            BackendError::Content(_)
        ));
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_without_network() {
        let provider = LlmProvider::new(LlmConfig {
            api_key: None,
            model: "m".into(),
            api_endpoint: "http://127.0.0.1:9/v1".into(),
            timeout: Duration::from_millis(100),
        });
        assert!(!provider.is_available());
        let result = provider
            .complete(&Prompt::new("s", "u"), &CompletionOptions::default())
            .await;
        assert!(matches!(result, Err(BackendError::Content(_))));
    }
}
