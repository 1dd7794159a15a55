//! Player state as pushed by the daemon.

use serde::{Deserialize, Serialize};

/// Playback status of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    #[default]
    Stop,
    Pause,
    Play,
}

/// Kind of media currently loaded in the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// A karaoke song from the library
    #[default]
    Song,
    Jingles,
    Sponsors,
    Intros,
    Outros,
    Encores,
}

/// The playlist item being played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSong {
    /// Karaoke id in the library
    pub kid: String,
    /// Position of the item in the current playlist
    #[serde(default)]
    pub plcid: Option<u32>,
    #[serde(default)]
    pub title: String,
    /// Media duration in seconds
    #[serde(default)]
    pub duration: f64,
    /// Nickname of whoever requested the song
    #[serde(default)]
    pub requested_by: Option<String>,
}

/// Full player state. Pushes carry any subset of these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct PlayerState {
    pub player_status: PlayerStatus,
    /// Seconds into the current media
    pub timeposition: f64,
    /// Backend (perceptual) volume, 0-100
    pub volume: f64,
    pub mute: bool,
    pub pitch: i32,
    /// Playback speed in percent
    pub speed: i32,
    pub show_subs: bool,
    pub blur_video: bool,
    /// A stop-after-current-song is pending
    pub stopping: bool,
    pub media_type: MediaType,
    pub current_song: Option<CurrentSong>,
    pub quiz_running: bool,
    pub fullscreen: bool,
    pub on_top: bool,
    pub border: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            player_status: PlayerStatus::Stop,
            timeposition: 0.0,
            volume: 100.0,
            mute: false,
            pitch: 0,
            speed: 100,
            show_subs: true,
            blur_video: false,
            stopping: false,
            media_type: MediaType::Song,
            current_song: None,
            quiz_running: false,
            fullscreen: false,
            on_top: false,
            border: true,
        }
    }
}

impl PlayerState {
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.player_status == PlayerStatus::Play
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.player_status == PlayerStatus::Stop
    }

    /// Whether the loaded media is a plain song rather than bundled media.
    #[must_use]
    pub fn is_song(&self) -> bool {
        self.media_type == MediaType::Song
    }

    #[must_use]
    pub fn quiz_active(&self) -> bool {
        self.quiz_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names_are_camel_case() {
        let value = serde_json::to_value(PlayerState::default()).unwrap();
        assert_eq!(value["playerStatus"], json!("stop"));
        assert_eq!(value["mediaType"], json!("song"));
        assert_eq!(value["quizRunning"], json!(false));
        assert!(value["currentSong"].is_null());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let state: PlayerState =
            serde_json::from_value(json!({"playerStatus": "play", "mediaType": "jingles"})).unwrap();
        assert!(state.is_playing());
        assert!(!state.is_song());
        assert_eq!(state.speed, 100);
    }
}
