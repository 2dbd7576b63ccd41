//! The abstraction over the upstream generation service.
//!
//! A Provider sends a conversation upstream and gets back either a single
//! structured response or an ordered sequence of [`StreamEvent`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use crate::error::ProviderError;
use crate::message::Message;

/// A request to the upstream model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Sampling temperature, provider default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            stream: false,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// The upstream body as received
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One fragment of a streamed tool call.
///
/// Fragments for the same call share an `index`; `name` and `arguments`
/// are partial strings to be concatenated in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A single decoded event of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental content and/or tool-call fragments.
    Delta {
        content: Option<String>,
        tool_calls: Vec<ToolCallDelta>,
    },

    /// Source URLs the upstream cited for this answer.
    Citations(Vec<String>),

    /// The upstream routed the request to a different model.
    SelectedModel(String),

    /// Token usage, usually on the final frame.
    Usage(Usage),

    /// Explicit end of stream.
    Done,
}

impl StreamEvent {
    /// Convenience constructor for a content-only delta.
    pub fn text(content: impl Into<String>) -> Self {
        StreamEvent::Delta {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Receiving half of a live upstream stream.
pub type EventStream = mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// What the upstream returned for a request.
#[derive(Debug)]
pub enum ProviderOutput {
    /// A single structured response.
    Single(ProviderResponse),

    /// A live event stream.
    Stream(EventStream),
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and return whatever shape the upstream answered with.
    ///
    /// Default implementation calls `complete()` and returns a single response.
    async fn generate(&self, request: ProviderRequest) -> std::result::Result<ProviderOutput, ProviderError> {
        Ok(ProviderOutput::Single(self.complete(request).await?))
    }
}
