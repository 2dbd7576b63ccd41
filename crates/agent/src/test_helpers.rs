//! Shared test doubles for the agent crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatweave_channels::{Broadcaster, EventEmitter, SessionRegistry};
use chatweave_core::error::{ExecutionError, ProviderError, ToolError};
use chatweave_core::event::{ChatEvent, EventEnvelope};
use chatweave_core::execution::{CodeExecutor, ExecutionOutput, ExecutionRequest};
use chatweave_core::message::Message;
use chatweave_core::provider::{
    Provider, ProviderOutput, ProviderRequest, ProviderResponse, StreamEvent, ToolCallDelta,
};
use chatweave_core::session::UserId;
use chatweave_core::tool::Tool;
use chatweave_storage::{InMemoryArtifactStore, InMemoryMessageStore};
use serde_json::{Map, Value, json};
use tokio::sync::{Notify, mpsc};

/// One scripted upstream answer.
pub enum Script {
    Single(ProviderResponse),
    /// Events delivered, then the stream closes.
    Stream(Vec<Result<StreamEvent, ProviderError>>),
    /// Events delivered, then the stream stays open.
    Hang(Vec<StreamEvent>),
    Fail(ProviderError),
}

/// A provider that answers from a queue of scripts and records requests.
///
/// An exhausted queue answers with an error rather than panicking, since
/// most calls happen inside spawned tasks.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
    open_streams: Mutex<Vec<mpsc::Sender<Result<StreamEvent, ProviderError>>>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            open_streams: Mutex::new(Vec::new()),
        }
    }

    pub fn single(text: &str) -> Script {
        Script::Single(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model: "scripted".into(),
            raw: json!({"choices": [{"message": {"content": text}}]}),
        })
    }

    /// Text deltas followed by an explicit end marker.
    pub fn text_stream(deltas: &[&str]) -> Script {
        let mut events: Vec<_> = deltas.iter().map(|d| Ok(StreamEvent::text(*d))).collect();
        events.push(Ok(StreamEvent::Done));
        Script::Stream(events)
    }

    /// A stream whose only content is one tool call, split in two fragments.
    pub fn tool_call_stream(id: &str, name: &str, arguments: &str) -> Script {
        let (head, tail) = arguments.split_at(arguments.len() / 2);
        Script::Stream(vec![
            Ok(StreamEvent::Delta {
                content: None,
                tool_calls: vec![ToolCallDelta {
                    index: 0,
                    id: Some(id.into()),
                    name: Some(name.into()),
                    arguments: Some(head.into()),
                }],
            }),
            Ok(StreamEvent::Delta {
                content: None,
                tool_calls: vec![ToolCallDelta {
                    index: 0,
                    arguments: Some(tail.into()),
                    ..Default::default()
                }],
            }),
            Ok(StreamEvent::Done),
        ])
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ProviderRequest) -> Option<Script> {
        self.requests.lock().unwrap().push(request);
        self.scripts.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Some(Script::Single(response)) => Ok(response),
            Some(Script::Fail(e)) => Err(e),
            Some(_) => Err(ProviderError::InvalidResponse("scripted stream for complete()".into())),
            None => Err(ProviderError::InvalidResponse("no scripted output left".into())),
        }
    }

    async fn generate(&self, request: ProviderRequest) -> Result<ProviderOutput, ProviderError> {
        match self.next(request) {
            Some(Script::Single(response)) => Ok(ProviderOutput::Single(response)),
            Some(Script::Stream(events)) => {
                let (tx, rx) = mpsc::channel(events.len() + 1);
                for event in events {
                    let _ = tx.try_send(event);
                }
                Ok(ProviderOutput::Stream(rx))
            }
            Some(Script::Hang(events)) => {
                let (tx, rx) = mpsc::channel(events.len() + 1);
                for event in events {
                    let _ = tx.try_send(Ok(event));
                }
                self.open_streams.lock().unwrap().push(tx);
                Ok(ProviderOutput::Stream(rx))
            }
            Some(Script::Fail(e)) => Err(e),
            None => Err(ProviderError::InvalidResponse("no scripted output left".into())),
        }
    }
}

/// Requires `city`; reports how many arguments made it through.
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Current weather for a city"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "units": { "type": "string" }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let city = arguments.get("city").and_then(Value::as_str).unwrap_or("nowhere");
        Ok(Value::String(format!("Sunny in {city} ({} args)", arguments.len())))
    }
}

pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: Map<String, Value>) -> Result<Value, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "backend unavailable".into(),
        })
    }
}

/// Signals `started`, then never returns.
pub struct StallingTool {
    pub started: Arc<Notify>,
}

#[async_trait]
impl Tool for StallingTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Never finishes"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: Map<String, Value>) -> Result<Value, ToolError> {
        self.started.notify_one();
        std::future::pending().await
    }
}

/// An executor answering from a queue; a drained queue yields a clean run.
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<ExecutionOutput, ExecutionError>>>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<Result<ExecutionOutput, ExecutionError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeExecutor for ScriptedExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput, ExecutionError> {
        self.requests.lock().unwrap().push(request);
        self.results.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ExecutionOutput {
                success: true,
                ..Default::default()
            })
        })
    }
}

/// In-memory collaborators with one connected session for `alice`.
pub struct Harness {
    pub store: Arc<InMemoryMessageStore>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub broadcaster: Broadcaster,
    events: Mutex<mpsc::Receiver<EventEnvelope>>,
}

pub fn harness() -> Harness {
    let registry = Arc::new(SessionRegistry::new(1024));
    let store = Arc::new(InMemoryMessageStore::new());
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let broadcaster = Broadcaster::new(registry.clone(), store.clone());
    let (_, rx) = registry.connect(&UserId::from("alice"));
    Harness {
        store,
        artifacts,
        broadcaster,
        events: Mutex::new(rx),
    }
}

impl Harness {
    pub fn emitter(&self) -> EventEmitter {
        self.broadcaster.emitter(UserId::from("alice"), None, "chat-1", "msg-1")
    }

    /// Drain every event delivered so far.
    pub fn events(&self) -> Vec<ChatEvent> {
        let mut rx = self.events.lock().unwrap();
        let mut events = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            events.push(envelope.data);
        }
        events
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(ChatEvent::event_type).collect()
    }
}
