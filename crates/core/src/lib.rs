//! # Chatweave Core
//!
//! Domain types, collaborator traits, and error definitions for the Chatweave
//! streaming completion assembler. Every external collaborator (upstream
//! model, tools, code sandbox, storage, live sessions) is a trait here;
//! implementations live in their respective crates.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod execution;
pub mod storage;
pub mod session;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderOutput, ProviderRequest, ProviderResponse, StreamEvent, ToolCallDelta};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use execution::{CodeExecutor, ExecutionOutput, ExecutionRequest};
pub use storage::{ArtifactStore, MessagePatch, MessageStore};
pub use session::{SessionDirectory, SessionId, UserId};
pub use event::{ChatEvent, EventEnvelope};
