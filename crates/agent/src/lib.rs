//! Completion orchestration for Chatweave.
//!
//! One completion request flows through:
//!
//! 1. **Request** the upstream model (single answer or event stream)
//! 2. **Assemble** streamed deltas into typed content blocks, broadcasting
//!    the rendered state to every session of the user
//! 3. **Act** when the stream stops on tool calls or on code to run, then
//!    resubmit with the results (bounded rounds)
//! 4. **Finalize**: persist, emit the terminal event, derive title and tags
//!
//! Streams run as cancellable background tasks tracked by [`TaskRegistry`].

pub mod code_loop;
pub mod orchestrator;
pub mod post_process;
pub mod prompts;
pub mod request;
pub mod settings;
pub mod tasks;
pub mod tool_loop;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use orchestrator::ResponseOrchestrator;
pub use request::{AttachedFile, CompletionOutcome, CompletionRequest, Features, PostProcessFlags};
pub use settings::CompletionSettings;
pub use tasks::TaskRegistry;
