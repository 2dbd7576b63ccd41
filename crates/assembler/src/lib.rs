//! # Chatweave Assembler
//!
//! Turns an incremental stream of model text into an ordered list of typed
//! content blocks (prose, reasoning traces, tool-call groups, code to run)
//! and renders that list for clients or for resubmission upstream.
//!
//! - [`scanner`]: incremental lexer for `<tag ...>` / `</tag>` markers
//! - [`block`]: the block model
//! - [`assembler`]: the per-response state owning the block list
//! - [`render`]: rendered and raw serialization

pub mod assembler;
pub mod block;
pub mod render;
pub mod scanner;

pub use assembler::{ContentAssembler, DeltaOutcome};
pub use block::{CodeBlock, ContentBlock, ReasoningBlock, ToolCallGroup};
pub use render::RenderMode;
pub use scanner::{BlockKind, TagFamily, TagScanner, Transition};
