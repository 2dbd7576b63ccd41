//! Session registry. Tracks every live connection per user.
//!
//! Each connected session owns a bounded queue; delivery never waits, so a
//! slow or disconnected client only loses its own events.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use chatweave_core::event::EventEnvelope;
use chatweave_core::session::{SessionDirectory, SessionId, UserId};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use uuid::Uuid;

struct SessionEntry {
    user: UserId,
    tx: mpsc::Sender<EventEnvelope>,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<SessionId, SessionEntry>,
    by_user: HashMap<UserId, BTreeSet<SessionId>>,
}

impl Sessions {
    /// Drop `id` from the user's set, and the set once it is empty.
    fn unlink(&mut self, user: &UserId, id: &SessionId) {
        if let Some(ids) = self.by_user.get_mut(user) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_user.remove(user);
            }
        }
    }
}

/// Identity-keyed registry of connected sessions.
pub struct SessionRegistry {
    buffer: usize,
    sessions: RwLock<Sessions>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SessionRegistry {
    /// Create a registry whose sessions buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            sessions: RwLock::new(Sessions::default()),
        }
    }

    /// Connect a new session for `user` under a generated id.
    pub fn connect(&self, user: &UserId) -> (SessionId, mpsc::Receiver<EventEnvelope>) {
        let id = SessionId(Uuid::new_v4().to_string());
        let rx = self.connect_as(user, id.clone());
        (id, rx)
    }

    /// Connect (or reconnect) a session under a known id.
    ///
    /// A reconnect replaces the previous queue; its receiver sees the end
    /// of the channel.
    pub fn connect_as(&self, user: &UserId, id: SessionId) -> mpsc::Receiver<EventEnvelope> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = sessions.by_id.insert(
            id.clone(),
            SessionEntry {
                user: user.clone(),
                tx,
            },
        ) {
            sessions.unlink(&previous.user, &id);
        }
        sessions.by_user.entry(user.clone()).or_default().insert(id.clone());

        info!(user = %user, session = %id, "Session connected");
        rx
    }

    /// Remove a session. Returns whether it was connected.
    pub fn disconnect(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = sessions.by_id.remove(id) else {
            return false;
        };
        sessions.unlink(&entry.user, id);
        info!(user = %entry.user, session = %id, "Session disconnected");
        true
    }

    /// Number of connected sessions across all users.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionDirectory for SessionRegistry {
    fn sessions_for(&self, user: &UserId) -> Vec<SessionId> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_user
            .get(user)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn deliver(&self, session: &SessionId, envelope: &EventEnvelope) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = sessions.by_id.get(session) else {
            trace!(session = %session, "Session not connected, event dropped");
            return false;
        };
        match entry.tx.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(e) => {
                debug!(session = %session, error = %e, "Event not delivered");
                false
            }
        }
    }
}
