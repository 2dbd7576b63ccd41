//! Identity and live-session addressing.

use serde::{Deserialize, Serialize};
use crate::event::EventEnvelope;

/// The user on whose behalf a completion runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live connection (tab, device) of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lookup and delivery over currently connected sessions.
pub trait SessionDirectory: Send + Sync {
    /// All sessions currently connected for `user`.
    fn sessions_for(&self, user: &UserId) -> Vec<SessionId>;

    /// Best-effort delivery; returns `false` when the session is gone or full.
    fn deliver(&self, session: &SessionId, envelope: &EventEnvelope) -> bool;
}
