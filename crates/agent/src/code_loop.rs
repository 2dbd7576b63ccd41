//! Code execution: staging inputs for the sandbox, running the code,
//! persisting produced files, and choosing the follow-up instruction.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chatweave_core::event::CodeExecutionResult;
use chatweave_core::execution::{CodeExecutor, ExecutionOutput, ExecutionRequest, StagedFile};
use chatweave_core::message::Message;
use chatweave_core::storage::{ArtifactStore, ChatFile, MessageStore};
use tracing::{debug, warn};

use crate::request::AttachedFile;

/// Attachment kinds that are not real files.
pub const SKIPPED_FILE_KINDS: [&str; 2] = ["collection", "web_search_results"];

/// Load every eligible attachment and encode it for the sandbox.
///
/// Pseudo-files, missing artifacts and files over `max_bytes` are skipped.
pub async fn stage_files(artifacts: &dyn ArtifactStore, files: &[AttachedFile], max_bytes: usize) -> Vec<StagedFile> {
    let mut staged = Vec::new();
    for file in files {
        if SKIPPED_FILE_KINDS.contains(&file.kind.as_str()) {
            continue;
        }
        match artifacts.fetch(&file.id).await {
            Ok(Some(bytes)) if bytes.len() <= max_bytes => staged.push(StagedFile {
                name: file.name.clone(),
                content: STANDARD.encode(&bytes),
            }),
            Ok(Some(bytes)) => {
                debug!(file = %file.name, size = bytes.len(), max_bytes, "Attachment too large to stage");
            }
            Ok(None) => debug!(file = %file.id, "Attachment not found, not staged"),
            Err(e) => warn!(file = %file.id, error = %e, "Failed to load attachment"),
        }
    }
    staged
}

/// Run code, turning any service failure into a failed output.
pub async fn run_code(executor: Option<&dyn CodeExecutor>, request: ExecutionRequest) -> ExecutionOutput {
    let Some(executor) = executor else {
        return ExecutionOutput::failure("Code execution service is not configured");
    };
    match executor.execute(request).await {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "Code execution request failed");
            ExecutionOutput::failure(e.to_string())
        }
    }
}

fn file_kind(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "svg") => "image",
        _ => "file",
    }
}

/// Persist every produced file that came back inline.
///
/// Each one is uploaded, registered on the chat, and its bytes replaced by
/// the artifact URL. A file that fails to persist keeps its inline bytes.
pub async fn persist_produced_files(
    output: &mut ExecutionOutput,
    artifacts: &dyn ArtifactStore,
    store: &dyn MessageStore,
    chat_id: &str,
) {
    for file in &mut output.files {
        let Some(encoded) = file.bytes.as_deref() else {
            continue;
        };
        let bytes = match STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %file.name, error = %e, "Produced file is not valid base64");
                continue;
            }
        };
        let artifact = match artifacts.upload(bytes, &file.name).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(file = %file.name, error = %e, "Failed to store produced file");
                continue;
            }
        };

        let chat_file = ChatFile {
            kind: file_kind(&file.name).to_string(),
            id: artifact.id.clone(),
            name: artifact.name.clone(),
            url: artifact.url.clone(),
        };
        if let Err(e) = store.add_chat_file(chat_id, chat_file).await {
            warn!(file = %file.name, error = %e, "Failed to register produced file on chat");
        }

        debug!(file = %file.name, url = %artifact.url, "Produced file stored");
        file.bytes = None;
        file.url = Some(artifact.url);
    }
}

/// The result block of a final code execution event.
pub fn execution_result(output: &ExecutionOutput) -> CodeExecutionResult {
    CodeExecutionResult {
        output: output.stdout.clone(),
        error: output.stderr.clone(),
        files: output.files.clone(),
    }
}

/// The follow-up instruction after attempt `attempt` (1-based) of `max`.
///
/// Chosen by attempt count alone; whether the code succeeded does not
/// matter.
pub fn followup_instruction<'a>(attempt: u32, max: u32, summary: &'a str, fail: &'a str) -> &'a str {
    if attempt < max { summary } else { fail }
}

/// History for the follow-up turn: the prior conversation, the assistant
/// turn so far in raw form, and the instruction as a user turn.
pub fn followup_messages(history: &[Message], raw_content: String, instruction: &str) -> Vec<Message> {
    let mut messages = history.to_vec();
    messages.push(Message::assistant(raw_content));
    messages.push(Message::user(serde_json::json!({ "instruction": instruction }).to_string()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedExecutor;
    use chatweave_core::error::ExecutionError;
    use chatweave_core::execution::ProducedFile;
    use chatweave_storage::{InMemoryArtifactStore, InMemoryMessageStore};
    use pretty_assertions::assert_eq;

    fn attached(kind: &str, id: &str, name: &str) -> AttachedFile {
        AttachedFile {
            kind: kind.into(),
            id: id.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn stages_only_eligible_files() {
        let artifacts = InMemoryArtifactStore::new();
        artifacts.insert("f1", "data.csv", b"a,b".to_vec()).await;
        artifacts.insert("f2", "big.bin", vec![0; 32]).await;
        artifacts.insert("c1", "docs", b"x".to_vec()).await;

        let files = vec![
            attached("file", "f1", "data.csv"),
            attached("file", "f2", "big.bin"),
            attached("collection", "c1", "docs"),
            attached("web_search_results", "w1", "results"),
            attached("file", "missing", "gone.txt"),
        ];
        let staged = stage_files(&artifacts, &files, 16).await;

        assert_eq!(
            staged,
            vec![StagedFile {
                name: "data.csv".into(),
                content: "YSxi".into(),
            }]
        );
    }

    #[tokio::test]
    async fn missing_executor_is_a_failed_run() {
        let output = run_code(
            None,
            ExecutionRequest {
                code: "print(1)".into(),
                timeout_secs: 10,
                files: vec![],
            },
        )
        .await;
        assert!(!output.success);
        assert!(output.stderr.contains("not configured"));
    }

    #[tokio::test]
    async fn service_error_becomes_stderr() {
        let executor = ScriptedExecutor::new(vec![Err(ExecutionError::Timeout { timeout_secs: 60 })]);
        let output = run_code(
            Some(&executor as &dyn CodeExecutor),
            ExecutionRequest {
                code: "while True: pass".into(),
                timeout_secs: 10,
                files: vec![],
            },
        )
        .await;
        assert!(!output.success);
        assert_eq!(output.stderr, "Execution timed out after 60s");
    }

    #[tokio::test]
    async fn produced_files_are_stored_and_linked() {
        let artifacts = InMemoryArtifactStore::new();
        let store = InMemoryMessageStore::new();
        let mut output = ExecutionOutput {
            success: true,
            files: vec![
                ProducedFile {
                    name: "plot.png".into(),
                    bytes: Some(STANDARD.encode(b"png")),
                    url: None,
                },
                ProducedFile {
                    name: "bad.txt".into(),
                    bytes: Some("***".into()),
                    url: None,
                },
            ],
            ..Default::default()
        };

        persist_produced_files(&mut output, &artifacts, &store, "chat").await;

        let url = output.files[0].url.clone().unwrap();
        assert!(output.files[0].bytes.is_none());
        assert!(url.starts_with("/api/v1/files/"));
        assert_eq!(output.files[1].bytes.as_deref(), Some("***"));
        assert!(output.files[1].url.is_none());

        let chat_files = store.chat_files("chat").await.unwrap();
        assert_eq!(chat_files.len(), 1);
        assert_eq!(chat_files[0].kind, "image");
        assert_eq!(chat_files[0].url, url);
        assert_eq!(artifacts.fetch(&chat_files[0].id).await.unwrap().unwrap(), b"png");
    }

    #[test]
    fn followup_depends_only_on_attempt_count() {
        assert_eq!(followup_instruction(1, 3, "summarize", "give up"), "summarize");
        assert_eq!(followup_instruction(2, 3, "summarize", "give up"), "summarize");
        assert_eq!(followup_instruction(3, 3, "summarize", "give up"), "give up");
    }

    #[test]
    fn followup_messages_wrap_instruction() {
        let messages = followup_messages(&[Message::user("plot it")], "raw".into(), "summarize");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "raw");
        assert_eq!(messages[2].content, r#"{"instruction":"summarize"}"#);
    }

    #[test]
    fn result_mirrors_output() {
        let result = execution_result(&ExecutionOutput {
            stdout: "out".into(),
            stderr: "err".into(),
            ..Default::default()
        });
        assert_eq!(result.output, "out");
        assert_eq!(result.error, "err");
        assert!(result.files.is_empty());
    }
}
