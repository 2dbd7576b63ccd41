//! Upstream clients for Chatweave.
//!
//! - [`OpenAiCompatProvider`] talks to any OpenAI-compatible
//!   `/chat/completions` endpoint and decodes `data:` frames into
//!   [`chatweave_core::StreamEvent`]s.
//! - [`HttpCodeExecutor`] submits code to the sandboxed execution service.

pub mod code_executor;
pub mod openai_compat;
pub mod sse;

pub use code_executor::HttpCodeExecutor;
pub use openai_compat::OpenAiCompatProvider;
pub use sse::{FrameDecoder, LineBuffer};
