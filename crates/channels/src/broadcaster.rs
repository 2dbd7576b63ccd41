//! Fan-out of chat events to a user's sessions.
//!
//! Delivery is fire-and-forget. `status`, `message` and `replace` events are
//! also written to the message store so a reconnecting client can resume
//! from storage.

use std::collections::BTreeSet;
use std::sync::Arc;

use chatweave_core::event::{ChatEvent, EventEnvelope};
use chatweave_core::session::{SessionDirectory, SessionId, UserId};
use chatweave_core::storage::{MessagePatch, MessageStore};
use tracing::{trace, warn};

/// Shared handles for building per-request emitters.
#[derive(Clone)]
pub struct Broadcaster {
    directory: Arc<dyn SessionDirectory>,
    store: Arc<dyn MessageStore>,
}

impl Broadcaster {
    pub fn new(directory: Arc<dyn SessionDirectory>, store: Arc<dyn MessageStore>) -> Self {
        Self { directory, store }
    }

    /// An emitter addressed to one chat message on behalf of `user`.
    ///
    /// `origin` is the session that started the request; it receives every
    /// event even if the directory does not list it for `user`.
    pub fn emitter(
        &self,
        user: UserId,
        origin: Option<SessionId>,
        chat_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> EventEmitter {
        EventEmitter {
            directory: self.directory.clone(),
            store: self.store.clone(),
            user,
            origin,
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }
}

/// Emits events for a single `(chat_id, message_id)`.
#[derive(Clone)]
pub struct EventEmitter {
    directory: Arc<dyn SessionDirectory>,
    store: Arc<dyn MessageStore>,
    user: UserId,
    origin: Option<SessionId>,
    chat_id: String,
    message_id: String,
}

impl EventEmitter {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Deliver `event` to every session of the user plus the origin session,
    /// then mirror it into storage when its kind requires. Returns the
    /// number of sessions that accepted the event.
    pub async fn emit(&self, event: ChatEvent) -> usize {
        let mut targets: BTreeSet<SessionId> = self.directory.sessions_for(&self.user).into_iter().collect();
        if let Some(origin) = &self.origin {
            targets.insert(origin.clone());
        }

        let envelope = EventEnvelope {
            chat_id: self.chat_id.clone(),
            message_id: self.message_id.clone(),
            data: event,
        };

        let delivered = targets
            .iter()
            .filter(|session| self.directory.deliver(session, &envelope))
            .count();
        trace!(
            event = envelope.data.event_type(),
            chat_id = %self.chat_id,
            delivered,
            targets = targets.len(),
            "Event emitted"
        );

        self.persist(&envelope.data).await;
        delivered
    }

    async fn persist(&self, event: &ChatEvent) {
        let result = match event {
            ChatEvent::Status(status) => {
                self.store
                    .add_message_status(&self.chat_id, &self.message_id, status.clone())
                    .await
            }
            ChatEvent::Message { content } => match self.store.get_message(&self.chat_id, &self.message_id).await {
                Ok(existing) => {
                    let mut full = existing.map(|m| m.content).unwrap_or_default();
                    full.push_str(content);
                    self.store
                        .upsert_message(&self.chat_id, &self.message_id, MessagePatch::content(full))
                        .await
                }
                Err(e) => Err(e),
            },
            ChatEvent::Replace { content } => {
                self.store
                    .upsert_message(&self.chat_id, &self.message_id, MessagePatch::content(content.clone()))
                    .await
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            warn!(
                event = event.event_type(),
                chat_id = %self.chat_id,
                message_id = %self.message_id,
                error = %e,
                "Failed to persist event"
            );
        }
    }
}
