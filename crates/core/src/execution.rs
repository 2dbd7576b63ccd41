//! The code execution sandbox behind the code interpreter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ExecutionError;

/// An input file staged for the sandbox, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub name: String,
    pub content: String,
}

/// Body submitted to the execution service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,

    /// Sandbox-side execution limit in seconds
    #[serde(rename = "timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub files: Vec<StagedFile>,
}

/// A file produced by the executed code.
///
/// The service returns inline base64 `bytes`; once persisted the bytes are
/// replaced by the artifact `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedFile {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Structured result of one sandbox run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub stdout: String,

    #[serde(default)]
    pub stderr: String,

    #[serde(default)]
    pub files: Vec<ProducedFile>,

    #[serde(default)]
    pub execution_id: Option<String>,
}

impl ExecutionOutput {
    /// A failed run whose only output is an explanatory error.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

/// Anything that can run model-authored code and report what happened.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> std::result::Result<ExecutionOutput, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_timeout_key() {
        let req = ExecutionRequest {
            code: "print(1)".into(),
            timeout_secs: 10,
            files: vec![],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["timeout"], 10);
        assert!(json.get("timeout_secs").is_none());
    }

    #[test]
    fn missing_output_fields_default() {
        let out: ExecutionOutput = serde_json::from_str(r#"{"stdout":"hi"}"#).unwrap();
        assert!(!out.success);
        assert_eq!(out.stdout, "hi");
        assert!(out.stderr.is_empty());
        assert!(out.files.is_empty());
        assert!(out.execution_id.is_none());
    }

    #[test]
    fn failure_sets_stderr() {
        let out = ExecutionOutput::failure("connection refused");
        assert!(!out.success);
        assert_eq!(out.stderr, "connection refused");
    }
}
