//! Real-time change events delivered by the gateway's subscription channel.

use serde::{Deserialize, Serialize};

/// The kind of change a real-time event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// A single change pushed by the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent<T> {
    pub action: Action,
    pub record: T,
}

impl<T> RealtimeEvent<T> {
    pub fn new(action: Action, record: T) -> Self {
        Self { action, record }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RealtimeEvent<U> {
        RealtimeEvent {
            action: self.action,
            record: f(self.record),
        }
    }

    /// Fallible variant of [`RealtimeEvent::map`], used to decode raw events.
    pub fn try_map<U, E, F: FnOnce(T) -> Result<U, E>>(self, f: F) -> Result<RealtimeEvent<U>, E> {
        let action = self.action;
        f(self.record).map(|record| RealtimeEvent { action, record })
    }
}
