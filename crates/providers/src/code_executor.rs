//! HTTP client for the remote code execution service.
//!
//! The service accepts `{code, timeout, files}` and answers with
//! `{success, stdout, stderr, files, execution_id}`.

use async_trait::async_trait;
use chatweave_config::CodeInterpreterConfig;
use chatweave_core::error::ExecutionError;
use chatweave_core::execution::{CodeExecutor, ExecutionOutput, ExecutionRequest};
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpCodeExecutor {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpCodeExecutor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// `None` when no executor URL is configured.
    pub fn from_config(config: &CodeInterpreterConfig) -> Option<Self> {
        config
            .executor_url
            .as_ref()
            .map(|url| Self::new(url.clone(), Duration::from_secs(config.timeout_secs)))
    }
}

#[async_trait]
impl CodeExecutor for HttpCodeExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput, ExecutionError> {
        debug!(url = %self.url, files = request.files.len(), "Submitting code for execution");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutionError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    ExecutionError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Execution service returned error");
            return Err(ExecutionError::Request(format!("status {}: {body}", status.as_u16())));
        }

        response.json::<ExecutionOutput>().await.map_err(|e| {
            if e.is_timeout() {
                ExecutionError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                ExecutionError::InvalidResponse(e.to_string())
            }
        })
    }
}
