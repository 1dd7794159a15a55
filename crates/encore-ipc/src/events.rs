//! IPC event types (server to client).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event pushed from daemon to every connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Build an event from any serializable payload.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn new<T: Serialize>(event: EventType, data: &T) -> serde_json::Result<Self> {
        Ok(Self { event, data: serde_json::to_value(data)? })
    }
}

/// Types of events clients can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// Partial player state
    PlayerStatus,
    /// Settings patch that was applied
    SettingsUpdated,
    QuizStart,
    QuizStop,
    /// Playlist collection changed
    PlaylistsUpdated,
    /// A playlist was imported from a file or remote source
    PlaylistImported,
    /// Server-side log line
    Log,
}

impl EventType {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerStatus => "playerStatus",
            Self::SettingsUpdated => "settingsUpdated",
            Self::QuizStart => "quizStart",
            Self::QuizStop => "quizStop",
            Self::PlaylistsUpdated => "playlistsUpdated",
            Self::PlaylistImported => "playlistImported",
            Self::Log => "log",
        }
    }
}

/// Log event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogData {
    pub level: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for event in [
            EventType::PlayerStatus,
            EventType::SettingsUpdated,
            EventType::QuizStart,
            EventType::QuizStop,
            EventType::PlaylistsUpdated,
            EventType::PlaylistImported,
            EventType::Log,
        ] {
            let wire = serde_json::to_value(event).unwrap();
            assert_eq!(wire.as_str(), Some(event.as_str()));
        }
    }
}
