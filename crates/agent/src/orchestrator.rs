//! The response orchestrator: one completion request, end to end.
//!
//! A streamed answer is driven by a [`CompletionRun`] on its own task:
//!
//! 1. **Pump** upstream events into the [`ContentAssembler`], broadcasting
//!    the rendered content after every text delta
//! 2. **Tool round** when the stream left pending tool calls: execute them,
//!    attach results, resubmit
//! 3. **Code round** when the stream ended on code that has not run: execute
//!    it in the sandbox, then ask the model to follow up
//! 4. **Finalize** once neither applies: persist, emit the terminal event,
//!    post-process
//!
//! Cancellation is checked at every await inside the drive loop; the
//! cancelled path persists what was assembled and emits `task-cancelled`.

use std::collections::HashSet;
use std::sync::Arc;

use chatweave_assembler::{ContentAssembler, RenderMode, render};
use chatweave_channels::{Broadcaster, EventEmitter};
use chatweave_core::error::Result;
use chatweave_core::event::{ChatEvent, CodeExecutionEvent, CompletionData, SourceCitation};
use chatweave_core::execution::{CodeExecutor, ExecutionOutput, ExecutionRequest};
use chatweave_core::message::Message;
use chatweave_core::provider::{EventStream, Provider, ProviderOutput, ProviderRequest, ProviderResponse, StreamEvent};
use chatweave_core::session::UserId;
use chatweave_core::storage::{ArtifactStore, MessagePatch, MessageStore};
use chatweave_core::tool::{ToolCall, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::code_loop;
use crate::post_process;
use crate::request::{AttachedFile, CompletionOutcome, CompletionRequest, PostProcessFlags};
use crate::settings::CompletionSettings;
use crate::tasks::TaskRegistry;
use crate::tool_loop;

/// Collaborators shared by every run.
#[derive(Clone)]
struct Shared {
    provider: Arc<dyn Provider>,
    store: Arc<dyn MessageStore>,
    artifacts: Arc<dyn ArtifactStore>,
    tools: Arc<ToolRegistry>,
    executor: Option<Arc<dyn CodeExecutor>>,
    settings: Arc<CompletionSettings>,
}

/// Entry point for completions.
pub struct ResponseOrchestrator {
    shared: Shared,
    broadcaster: Broadcaster,
    tasks: TaskRegistry,
}

impl ResponseOrchestrator {
    pub fn new(provider: Arc<dyn Provider>, broadcaster: Broadcaster, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            shared: Shared {
                provider,
                store: broadcaster.store().clone(),
                artifacts,
                tools: Arc::new(ToolRegistry::new()),
                executor: None,
                settings: Arc::new(CompletionSettings::default()),
            },
            broadcaster,
            tasks: TaskRegistry::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.shared.tools = Arc::new(tools);
        self
    }

    pub fn with_code_executor(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.shared.executor = Some(executor);
        self
    }

    pub fn with_settings(mut self, settings: CompletionSettings) -> Self {
        self.shared.settings = Arc::new(settings);
        self
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.shared.settings
    }

    /// Start a completion for `user`.
    ///
    /// A streamed answer is assembled on a background task whose id is
    /// returned; a single answer is stored and returned directly. Only a
    /// failure of the initial upstream request is an error.
    pub async fn run_completion(
        &self,
        request: CompletionRequest,
        user: UserId,
        flags: PostProcessFlags,
    ) -> Result<CompletionOutcome> {
        let emitter = self.broadcaster.emitter(
            user,
            request.session_id.clone(),
            request.chat_id.clone(),
            request.message_id.clone(),
        );

        let upstream = ProviderRequest::new(request.model.clone(), request.messages.clone())
            .streaming(request.stream)
            .with_tools(self.shared.tools.definitions());

        info!(
            chat_id = %request.chat_id,
            message_id = %request.message_id,
            model = %request.model,
            provider = self.shared.provider.name(),
            "Starting completion"
        );

        match self.shared.provider.generate(upstream).await? {
            ProviderOutput::Single(response) => {
                let content = self.finish_single(&request, &emitter, response, flags).await;
                Ok(CompletionOutcome::Direct { content })
            }
            ProviderOutput::Stream(rx) => {
                let run = CompletionRun::new(self.shared.clone(), request, emitter, flags);
                let task_id = self.tasks.spawn(move |token| run.execute(rx, token));
                debug!(%task_id, "Completion task spawned");
                Ok(CompletionOutcome::Spawned { task_id })
            }
        }
    }

    async fn finish_single(
        &self,
        request: &CompletionRequest,
        emitter: &EventEmitter,
        response: ProviderResponse,
        flags: PostProcessFlags,
    ) -> String {
        let store = &self.shared.store;
        let content = response.message.content;

        let mut patch = MessagePatch::content(content.clone());
        patch.selected_model_id = response
            .raw
            .get("selected_model_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if let Err(e) = store.upsert_message(&request.chat_id, &request.message_id, patch).await {
            warn!(chat_id = %request.chat_id, error = %e, "Failed to store answer");
        }

        let title = chat_title(store.as_ref(), &request.chat_id).await;
        emitter
            .emit(ChatEvent::Completion(CompletionData::finished(content.clone(), title)))
            .await;

        let mut history = request.messages.clone();
        history.push(Message::assistant(content.clone()));
        post_process::run(
            self.shared.provider.as_ref(),
            store.as_ref(),
            emitter,
            &request.model,
            &history,
            flags,
        )
        .await;

        content
    }

    /// Signal cooperative cancellation of a running completion.
    pub fn cancel(&self, task_id: &str) -> bool {
        let found = self.tasks.cancel(task_id);
        info!(%task_id, found, "Cancellation requested");
        found
    }

    /// Wait until a completion task has finished.
    pub async fn join(&self, task_id: &str) -> bool {
        self.tasks.join(task_id).await
    }

    pub fn list_tasks(&self) -> Vec<String> {
        self.tasks.list()
    }
}

async fn chat_title(store: &dyn MessageStore, chat_id: &str) -> Option<String> {
    match store.chat_title(chat_id).await {
        Ok(title) => title,
        Err(e) => {
            warn!(chat_id, error = %e, "Failed to read chat title");
            None
        }
    }
}

/// What the upstream answered to a resubmission.
enum Turn {
    Stream(EventStream),
    Ended,
}

/// State of one streamed completion.
struct CompletionRun {
    shared: Shared,
    request: CompletionRequest,
    emitter: EventEmitter,
    flags: PostProcessFlags,
    assembler: ContentAssembler,

    /// Model for resubmissions; follows `selected_model_id` frames.
    model: String,
    sources: Vec<SourceCitation>,

    /// Conversation sent upstream, grown by every round.
    history: Vec<Message>,

    /// First block not yet part of `history`.
    segment_start: usize,
    tool_rounds: u32,
    code_attempts: u32,
}

impl CompletionRun {
    fn new(shared: Shared, request: CompletionRequest, emitter: EventEmitter, flags: PostProcessFlags) -> Self {
        let scanner = shared.settings.scanner(request.features.code_interpreter);
        Self {
            model: request.model.clone(),
            history: request.messages.clone(),
            assembler: ContentAssembler::new(scanner),
            shared,
            request,
            emitter,
            flags,
            sources: Vec::new(),
            segment_start: 0,
            tool_rounds: 0,
            code_attempts: 0,
        }
    }

    async fn execute(mut self, rx: EventStream, token: CancellationToken) {
        self.seed().await;

        let cancelled = tokio::select! {
            biased;
            _ = token.cancelled() => true,
            _ = self.drive(rx) => false,
        };

        if cancelled {
            self.finalize_cancelled().await;
        } else {
            self.finalize().await;
        }
    }

    /// Continue from content already stored for the message.
    async fn seed(&mut self) {
        let stored = self
            .shared
            .store
            .get_message(&self.request.chat_id, &self.request.message_id)
            .await;
        match stored {
            Ok(Some(message)) if !message.content.is_empty() => {
                debug!(chat_id = %self.request.chat_id, "Continuing stored message");
                let scanner = self.shared.settings.scanner(self.request.features.code_interpreter);
                self.assembler = ContentAssembler::with_initial_text(scanner, message.content);
            }
            Ok(_) => {}
            Err(e) => warn!(chat_id = %self.request.chat_id, error = %e, "Failed to load stored message"),
        }
    }

    async fn drive(&mut self, rx: EventStream) {
        let settings = self.shared.settings.clone();
        let mut next = Some(rx);

        loop {
            if let Some(rx) = next.take() {
                self.pump(rx).await;
            }

            let mut turn = None;
            if self.assembler.has_pending_tool_calls() {
                let calls = self.assembler.take_tool_calls();
                if self.tool_rounds < settings.max_tool_call_retries {
                    turn = Some(self.tool_round(calls).await);
                } else {
                    warn!(
                        chat_id = %self.request.chat_id,
                        rounds = self.tool_rounds,
                        dropped = calls.len(),
                        "Tool call budget exhausted"
                    );
                }
            }

            let turn = match turn {
                Some(turn) => turn,
                None if self.wants_code_round(&settings) => self.code_round().await,
                None => break,
            };

            match turn {
                Turn::Stream(rx) => next = Some(rx),
                Turn::Ended => break,
            }
        }
    }

    fn wants_code_round(&self, settings: &CompletionSettings) -> bool {
        if !self.request.features.code_interpreter || self.assembler.code_tail().is_none() {
            return false;
        }
        if self.code_attempts >= settings.max_code_retries {
            warn!(
                chat_id = %self.request.chat_id,
                attempts = self.code_attempts,
                "Code execution budget exhausted"
            );
            return false;
        }
        true
    }

    /// Feed one upstream stream into the assembler until it ends or a code
    /// block closes.
    async fn pump(&mut self, mut rx: EventStream) {
        while let Some(item) = rx.recv().await {
            match item {
                Ok(StreamEvent::Delta { content, tool_calls }) => {
                    for call in tool_calls {
                        self.assembler.append_tool_call_fragment(
                            call.index,
                            call.id.as_deref(),
                            call.name.as_deref(),
                            call.arguments.as_deref(),
                        );
                    }
                    if let Some(text) = content {
                        let outcome = self.assembler.append_delta(&text);
                        self.publish().await;
                        if outcome.code_ready {
                            debug!(chat_id = %self.request.chat_id, "Code block closed, leaving stream");
                            break;
                        }
                    }
                }
                Ok(StreamEvent::Citations(urls)) => {
                    self.sources = urls.into_iter().map(SourceCitation::from_url).collect();
                }
                Ok(StreamEvent::SelectedModel(model)) => {
                    debug!(%model, "Upstream selected model");
                    self.store_patch(MessagePatch::selected_model(model.clone())).await;
                    self.model = model;
                }
                Ok(StreamEvent::Usage(usage)) => {
                    debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "Usage reported"
                    );
                }
                Ok(StreamEvent::Done) => break,
                Err(e) => {
                    warn!(chat_id = %self.request.chat_id, error = %e, "Upstream stream failed");
                    break;
                }
            }
        }
        self.assembler.end_stream();
    }

    /// Broadcast the rendered content, saving it too when realtime save is on.
    async fn publish(&self) {
        let content = self.assembler.rendered();
        if self.shared.settings.realtime_save {
            self.store_patch(MessagePatch::content(content.clone())).await;
        }
        self.emitter
            .emit(ChatEvent::Completion(CompletionData::content(content)))
            .await;
    }

    async fn store_patch(&self, patch: MessagePatch) {
        if let Err(e) = self
            .shared
            .store
            .upsert_message(&self.request.chat_id, &self.request.message_id, patch)
            .await
        {
            warn!(chat_id = %self.request.chat_id, error = %e, "Failed to store message");
        }
    }

    /// Raw rendering of the blocks since the last round.
    fn take_segment(&mut self) -> String {
        let blocks = self.assembler.blocks();
        let start = self.segment_start.min(blocks.len());
        render::serialize(&blocks[start..], RenderMode::Raw, 0)
    }

    fn open_turn(&mut self) {
        self.segment_start = self.assembler.blocks().len();
        self.assembler.open_text();
    }

    async fn tool_round(&mut self, calls: Vec<ToolCall>) -> Turn {
        self.tool_rounds += 1;
        info!(
            chat_id = %self.request.chat_id,
            round = self.tool_rounds,
            calls = calls.len(),
            "Executing tool calls"
        );

        let raw = self.take_segment();
        self.assembler.push_tool_group(calls.clone());
        self.publish().await;

        let results = tool_loop::execute_tool_calls(&self.shared.tools, &calls).await;
        self.assembler.attach_tool_results(results.clone());
        self.publish().await;

        self.history = tool_loop::resubmission_messages(&self.history, raw, calls, &results);
        self.open_turn();

        let request = ProviderRequest::new(self.model.clone(), self.history.clone())
            .streaming(true)
            .with_tools(self.shared.tools.definitions());
        self.next_turn(request).await
    }

    async fn code_round(&mut self) -> Turn {
        let settings = self.shared.settings.clone();
        let Some(block) = self.assembler.code_tail() else {
            return Turn::Ended;
        };
        let code = block.content.trim().to_string();
        let executable = block.is_executable() && !code.is_empty();

        self.code_attempts += 1;
        info!(
            chat_id = %self.request.chat_id,
            attempt = self.code_attempts,
            executable,
            "Code execution round"
        );

        let output = if executable {
            self.execute_code(code, &settings).await
        } else {
            ExecutionOutput::default()
        };
        self.assembler.set_code_output(output);
        self.publish().await;

        let instruction = code_loop::followup_instruction(
            self.code_attempts,
            settings.max_code_retries,
            &settings.summary_prompt,
            &settings.fail_prompt,
        );
        let raw = self.take_segment();
        self.history = code_loop::followup_messages(&self.history, raw, instruction);
        self.open_turn();

        let model = settings.code_model.clone().unwrap_or_else(|| self.model.clone());
        let request = ProviderRequest::new(model, self.history.clone()).streaming(true);
        self.next_turn(request).await
    }

    async fn execute_code(&self, code: String, settings: &CompletionSettings) -> ExecutionOutput {
        let execution_id = Uuid::new_v4().to_string();
        let event = CodeExecutionEvent::python(execution_id, code.clone());
        self.emitter.emit(ChatEvent::Source(event.clone())).await;

        let files = self.attachments().await;
        let mut staged =
            code_loop::stage_files(self.shared.artifacts.as_ref(), &files, settings.max_file_bytes).await;
        staged.extend(self.request.images.iter().cloned());

        let request = ExecutionRequest {
            code,
            timeout_secs: settings.sandbox_timeout_secs,
            files: staged,
        };
        let mut output = code_loop::run_code(self.shared.executor.as_deref(), request).await;
        code_loop::persist_produced_files(
            &mut output,
            self.shared.artifacts.as_ref(),
            self.shared.store.as_ref(),
            &self.request.chat_id,
        )
        .await;
        debug!(success = output.success, files = output.files.len(), "Code executed");

        self.emitter
            .emit(ChatEvent::Source(event.with_result(code_loop::execution_result(&output))))
            .await;
        output
    }

    /// Request attachments plus files already registered on the chat.
    async fn attachments(&self) -> Vec<AttachedFile> {
        let mut files = self.request.files.clone();
        match self.shared.store.chat_files(&self.request.chat_id).await {
            Ok(chat_files) => {
                let mut seen: HashSet<String> = files.iter().map(|f| f.id.clone()).collect();
                files.extend(
                    chat_files
                        .into_iter()
                        .filter(|f| seen.insert(f.id.clone()))
                        .map(|f| AttachedFile {
                            kind: f.kind,
                            id: f.id,
                            name: f.name,
                        }),
                );
            }
            Err(e) => warn!(chat_id = %self.request.chat_id, error = %e, "Failed to list chat files"),
        }
        files
    }

    async fn next_turn(&mut self, request: ProviderRequest) -> Turn {
        match self.shared.provider.generate(request).await {
            Ok(ProviderOutput::Stream(rx)) => Turn::Stream(rx),
            Ok(ProviderOutput::Single(response)) => {
                self.absorb(response).await;
                Turn::Ended
            }
            Err(e) => {
                warn!(chat_id = %self.request.chat_id, error = %e, "Resubmission failed");
                Turn::Ended
            }
        }
    }

    /// Keep the text of a non-streamed answer; it ends the loop, so any tool
    /// calls it carries are not run.
    async fn absorb(&mut self, response: ProviderResponse) {
        if !response.message.tool_calls.is_empty() {
            warn!(
                chat_id = %self.request.chat_id,
                dropped = response.message.tool_calls.len(),
                "Non-streamed resubmission answer, tool calls ignored"
            );
        }
        self.assembler.append_delta(&response.message.content);
        self.assembler.end_stream();
        self.publish().await;
    }

    fn persist_patch(&self, content: String) -> MessagePatch {
        let patch = MessagePatch::content(content);
        if self.sources.is_empty() {
            patch
        } else {
            patch.with_sources(self.sources.clone())
        }
    }

    async fn finalize(mut self) {
        self.assembler.end_stream();
        let content = self.assembler.rendered();
        self.store_patch(self.persist_patch(content.clone())).await;

        if !self.sources.is_empty() {
            self.emitter
                .emit(ChatEvent::Completion(CompletionData::sources(self.sources.clone())))
                .await;
        }

        let store = self.shared.store.clone();
        let title = chat_title(store.as_ref(), &self.request.chat_id).await;
        self.emitter
            .emit(ChatEvent::Completion(CompletionData::finished(content.clone(), title)))
            .await;

        info!(
            chat_id = %self.request.chat_id,
            message_id = %self.request.message_id,
            blocks = self.assembler.blocks().len(),
            tool_rounds = self.tool_rounds,
            code_attempts = self.code_attempts,
            "Completion finished"
        );

        let mut history = self.request.messages.clone();
        history.push(Message::assistant(content));
        post_process::run(
            self.shared.provider.as_ref(),
            store.as_ref(),
            &self.emitter,
            &self.request.model,
            &history,
            self.flags,
        )
        .await;
    }

    async fn finalize_cancelled(mut self) {
        self.assembler.end_stream();
        let content = self.assembler.rendered();
        self.store_patch(self.persist_patch(content)).await;
        self.emitter.emit(ChatEvent::TaskCancelled).await;

        info!(
            chat_id = %self.request.chat_id,
            message_id = %self.request.message_id,
            blocks = self.assembler.blocks().len(),
            "Completion cancelled"
        );
    }
}
