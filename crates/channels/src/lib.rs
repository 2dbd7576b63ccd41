//! Live delivery of chat events.
//!
//! - **Registry**: identity-keyed table of connected sessions, each with a
//!   bounded outbound queue
//! - **Broadcaster**: fans events out to every session of a user and
//!   mirrors status/message/replace events into durable storage

pub mod broadcaster;
pub mod registry;

pub use broadcaster::{Broadcaster, EventEmitter};
pub use registry::SessionRegistry;
