//! Title and tag derivation after a clean completion.

use chatweave_channels::EventEmitter;
use chatweave_core::event::ChatEvent;
use chatweave_core::message::{Message, Role};
use chatweave_core::provider::{Provider, ProviderRequest};
use chatweave_core::storage::MessageStore;
use tracing::{debug, warn};

use crate::prompts;
use crate::request::PostProcessFlags;

/// The slice between the first `{` and the last `}`, inclusive.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Title from a task answer such as `Sure! {"title": "Oslo weather"}`.
pub fn parse_title(answer: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(extract_json_object(answer)?).ok()?;
    value
        .get("title")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Tags from a task answer such as `{"tags": ["Weather", "Travel"]}`.
pub fn parse_tags(answer: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(extract_json_object(answer)?).ok()?;
    let tags = value.get("tags")?.as_array()?;
    Some(
        tags.iter()
            .filter_map(|t| t.as_str())
            .map(str::to_string)
            .collect(),
    )
}

fn first_user_message(history: &[Message]) -> Option<String> {
    history
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
}

async fn ask(provider: &dyn Provider, model: &str, prompt: String) -> Option<String> {
    let request = ProviderRequest::new(model, vec![Message::user(prompt)]);
    match provider.complete(request).await {
        Ok(response) => Some(response.message.content),
        Err(e) => {
            warn!(error = %e, "Post-processing request failed");
            None
        }
    }
}

/// Run the requested post-processing for a finished conversation.
///
/// `history` is the conversation including the new assistant answer.
pub async fn run(
    provider: &dyn Provider,
    store: &dyn MessageStore,
    emitter: &EventEmitter,
    model: &str,
    history: &[Message],
    flags: PostProcessFlags,
) {
    let chat_id = emitter.chat_id();

    let title = if flags.title_generation {
        ask(provider, model, prompts::title_prompt(history))
            .await
            .and_then(|answer| parse_title(&answer))
            .or_else(|| first_user_message(history))
    } else if history.iter().filter(|m| m.role != Role::System).count() == 2 {
        first_user_message(history)
    } else {
        None
    };

    if let Some(title) = title {
        debug!(chat_id, %title, "Chat title set");
        if let Err(e) = store.set_chat_title(chat_id, &title).await {
            warn!(chat_id, error = %e, "Failed to store chat title");
        }
        emitter.emit(ChatEvent::Title(title)).await;
    }

    if flags.tags_generation {
        let answer = ask(provider, model, prompts::tags_prompt(history)).await;
        match answer.as_deref().and_then(parse_tags) {
            Some(tags) => {
                if let Err(e) = store.set_chat_tags(chat_id, &tags).await {
                    warn!(chat_id, error = %e, "Failed to store chat tags");
                }
                emitter.emit(ChatEvent::Tags(tags)).await;
            }
            None => debug!(chat_id, "No usable tags in answer"),
        }
    }
}
