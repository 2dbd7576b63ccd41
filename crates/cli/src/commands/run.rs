//! `chatweave run` prints one completion as a JSON line per live event.
//!
//! Logs go to stderr; stdout carries only event envelopes.

use std::sync::Arc;

use chatweave_agent::{CompletionOutcome, CompletionRequest, CompletionSettings, PostProcessFlags, ResponseOrchestrator};
use chatweave_channels::{Broadcaster, SessionRegistry};
use chatweave_config::AppConfig;
use chatweave_core::message::Message;
use chatweave_core::session::UserId;
use chatweave_core::storage::ArtifactStore;
use chatweave_providers::{HttpCodeExecutor, OpenAiCompatProvider};
use chatweave_storage::{FsArtifactStore, InMemoryArtifactStore, InMemoryMessageStore};
use clap::Args;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// The user message to send
    #[arg(short, long)]
    pub message: String,

    /// Model to use instead of the configured default
    #[arg(long)]
    pub model: Option<String>,

    /// Recognize and execute code interpreter blocks
    #[arg(long)]
    pub code_interpreter: bool,

    /// Generate a chat title afterwards
    #[arg(long)]
    pub title: bool,

    /// Generate chat tags afterwards
    #[arg(long)]
    pub tags: bool,

    /// Ask the upstream for a single JSON answer
    #[arg(long)]
    pub no_stream: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set CHATWEAVE_API_KEY or OPENAI_API_KEY, or add api_key to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let registry = Arc::new(SessionRegistry::new(config.broadcast.session_buffer));
    let store = Arc::new(InMemoryMessageStore::new());
    let artifacts: Arc<dyn ArtifactStore> = match &config.storage.artifact_dir {
        Some(dir) => Arc::new(FsArtifactStore::new(dir.clone())),
        None => Arc::new(InMemoryArtifactStore::new()),
    };

    let user = UserId::from("local");
    let (session, mut events) = registry.connect(&user);

    let mut orchestrator = ResponseOrchestrator::new(
        Arc::new(OpenAiCompatProvider::from_config(&config)),
        Broadcaster::new(registry.clone(), store),
        artifacts,
    )
    .with_settings(CompletionSettings::from(&config));
    match HttpCodeExecutor::from_config(&config.code_interpreter) {
        Some(executor) => orchestrator = orchestrator.with_code_executor(Arc::new(executor)),
        None if args.code_interpreter => warn!("No code executor configured; code blocks will fail"),
        None => {}
    }

    let printer = tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to encode event"),
            }
        }
    });

    let model = args.model.unwrap_or_else(|| config.provider.default_model.clone());
    let mut request = CompletionRequest::new(
        model,
        vec![Message::user(args.message)],
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
    )
    .with_session(session.clone())
    .with_code_interpreter(args.code_interpreter);
    request.stream = !args.no_stream;

    let flags = PostProcessFlags {
        title_generation: args.title,
        tags_generation: args.tags,
    };

    match orchestrator.run_completion(request, user, flags).await? {
        CompletionOutcome::Spawned { task_id } => {
            info!(%task_id, "Streaming completion");
            tokio::select! {
                _ = orchestrator.join(&task_id) => {}
                _ = tokio::signal::ctrl_c() => {
                    orchestrator.cancel(&task_id);
                    orchestrator.join(&task_id).await;
                }
            }
        }
        CompletionOutcome::Direct { content } => {
            info!(chars = content.len(), "Upstream answered directly");
        }
    }

    registry.disconnect(&session);
    printer.await?;
    Ok(())
}
