//! Mutable daemon state and application of validated commands.

use std::collections::BTreeMap;

use encore_core::{Command, PlayerState, ServerMode, Settings};
use encore_ipc::{ErrorInfo, Event, EventType, LogData};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::engine::{Patch, PlayerEngine};
use crate::playlists::Playlists;

#[derive(Debug, Default)]
struct Quiz {
    /// Whether the current song is allowed to continue past the guess
    continue_song: bool,
    /// Latest answer per nickname
    answers: BTreeMap<String, String>,
}

/// Result of applying a command: the response payload and the pushes to
/// broadcast once the response has been sent.
#[derive(Debug, Default)]
pub struct Applied {
    pub data: Value,
    pub events: Vec<Event>,
}

impl Applied {
    fn with_data<T: Serialize>(data: &T) -> Result<Self, ErrorInfo> {
        Ok(Self { data: serde_json::to_value(data).map_err(internal)?, events: Vec::new() })
    }

    fn push<T: Serialize>(mut self, event: EventType, data: &T) -> Result<Self, ErrorInfo> {
        self.events.push(Event::new(event, data).map_err(internal)?);
        Ok(self)
    }

    fn player(mut self, patch: Patch) -> Self {
        if !patch.is_empty() {
            self.events.push(Event { event: EventType::PlayerStatus, data: Value::Object(patch) });
        }
        self
    }
}

fn internal(e: serde_json::Error) -> ErrorInfo {
    ErrorInfo::internal(e.to_string())
}

#[derive(Debug)]
pub struct DaemonState {
    engine: PlayerEngine,
    settings: Settings,
    playlists: Playlists,
    mode: ServerMode,
    quiz: Quiz,
}

impl DaemonState {
    pub fn new(settings: Settings, mode: ServerMode) -> Self {
        Self {
            engine: PlayerEngine::new(settings.player.volume, settings.karaoke.repeat_playlist),
            settings,
            playlists: Playlists::new(),
            mode,
            quiz: Quiz::default(),
        }
    }

    pub fn player(&self) -> &PlayerState {
        self.engine.state()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn playlists(&self) -> &Playlists {
        &self.playlists
    }

    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    /// Apply a command that has already been authorized and validated.
    ///
    /// # Errors
    /// Returns a 404 for unknown playlists and a 500 if a payload cannot be
    /// serialized.
    pub fn apply(&mut self, command: Command) -> Result<Applied, ErrorInfo> {
        match command {
            Command::Player { command, options } => {
                let patch = self.engine.control(command, options, self.playlists.current_karas());
                Ok(Applied::default().player(patch))
            }

            Command::UpdateSettings(patch) => {
                if patch.is_empty() {
                    return Applied::with_data(&self.settings);
                }
                self.settings.apply(patch.clone());
                self.engine.set_repeat(self.settings.karaoke.repeat_playlist);
                info!("Settings updated");
                Applied::with_data(&self.settings)?.push(EventType::SettingsUpdated, &patch)
            }

            Command::SetServerMode(mode) => {
                self.mode = mode;
                info!(?mode, "Server mode changed");
                let log = LogData { level: "info".into(), message: format!("Server mode set to {mode:?}") };
                Applied::default().push(EventType::Log, &log)
            }

            Command::StartQuiz => {
                self.quiz = Quiz::default();
                let patch = self.engine.set_quiz_running(true);
                info!("Quiz started");
                Applied::default().player(patch).push(EventType::QuizStart, &json!({}))
            }

            Command::StopQuiz => {
                let answers = std::mem::take(&mut self.quiz.answers);
                self.quiz.continue_song = false;
                let patch = self.engine.set_quiz_running(false);
                info!(answers = answers.len(), "Quiz stopped");
                Applied::default().player(patch).push(EventType::QuizStop, &json!({ "answers": answers }))
            }

            Command::ContinueQuizSong => {
                self.quiz.continue_song = !self.quiz.continue_song;
                Applied::with_data(&self.quiz.continue_song)
            }

            Command::AnswerQuiz { nickname, answer } => {
                self.quiz.answers.insert(nickname, answer);
                Ok(Applied::default())
            }

            Command::CreatePlaylist { name } => {
                let playlist = self.playlists.create(&name);
                info!(plaid = playlist.plaid, name = %playlist.name, "Playlist created");
                Applied::with_data(&playlist)?.push(EventType::PlaylistsUpdated, &self.playlists.list())
            }

            Command::ImportPlaylist { name, kids } => {
                let playlist = self.playlists.import(&name, kids);
                info!(plaid = playlist.plaid, karas = playlist.karas.len(), "Playlist imported");
                Applied::with_data(&playlist)?
                    .push(EventType::PlaylistImported, &playlist)?
                    .push(EventType::PlaylistsUpdated, &self.playlists.list())
            }

            Command::AddKaraToPlaylist { plaid, kid, requester } => {
                self.playlists
                    .add(plaid, kid, &requester)
                    .map_err(|e| ErrorInfo::not_found(e.to_string()))?;
                Applied::default().push(EventType::PlaylistsUpdated, &self.playlists.list())
            }

            Command::DeletePlaylist { plaid } => {
                self.playlists.delete(plaid).map_err(|e| ErrorInfo::not_found(e.to_string()))?;
                info!(plaid, "Playlist deleted");
                Applied::default().push(EventType::PlaylistsUpdated, &self.playlists.list())
            }
        }
    }

    /// Advance playback; returns the pushes to broadcast.
    pub fn tick(&mut self, elapsed: f64) -> Vec<Event> {
        let patch = self.engine.tick(
            elapsed,
            self.playlists.current_karas(),
            &self.settings.playlist.intermission_media,
        );
        if patch.is_empty() {
            return Vec::new();
        }
        if self.player().is_stopped() && patch.contains_key("playerStatus") {
            warn!("Playback reached the end of the current playlist");
        }
        Applied::default().player(patch).events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_core::ControlCommand;
    use encore_core::settings::{KaraokePatch, SettingsPatch};

    fn state() -> DaemonState {
        DaemonState::new(Settings::default(), ServerMode::Normal)
    }

    fn add(state: &mut DaemonState, plaid: u32, kid: &str) {
        let requester = "Alice".to_string();
        state.apply(Command::AddKaraToPlaylist { plaid, kid: kid.into(), requester }).unwrap();
    }

    fn play(state: &mut DaemonState) -> Applied {
        state.apply(Command::Player { command: ControlCommand::Play, options: None }).unwrap()
    }

    #[test]
    fn test_player_command_pushes_partial_state() {
        let mut state = state();
        let plaid = state.playlists().current_plaid();
        add(&mut state, plaid, "kara-1");

        let applied = play(&mut state);
        assert_eq!(applied.events.len(), 1);
        assert_eq!(applied.events[0].event, EventType::PlayerStatus);
        assert_eq!(applied.events[0].data["playerStatus"], json!("play"));
        assert!(applied.events[0].data.get("volume").is_none());
    }

    #[test]
    fn test_no_op_command_pushes_nothing() {
        let mut state = state();
        let applied =
            state.apply(Command::Player { command: ControlCommand::Unmute, options: None }).unwrap();
        assert!(applied.events.is_empty());
        assert_eq!(applied.data, Value::Null);
    }

    #[test]
    fn test_settings_update_pushes_patch() {
        let mut state = state();
        let patch = SettingsPatch {
            karaoke: Some(KaraokePatch { classic_mode: Some(true), ..KaraokePatch::default() }),
            ..SettingsPatch::default()
        };

        let applied = state.apply(Command::UpdateSettings(patch)).unwrap();
        assert!(state.settings().karaoke.classic_mode);
        assert_eq!(applied.data["karaoke"]["classicMode"], json!(true));
        assert_eq!(applied.events[0].event, EventType::SettingsUpdated);
        assert_eq!(applied.events[0].data, json!({"karaoke": {"classicMode": true}}));
    }

    #[test]
    fn test_empty_settings_update_pushes_nothing() {
        let mut state = state();
        let applied = state.apply(Command::UpdateSettings(SettingsPatch::default())).unwrap();
        assert!(applied.events.is_empty());
        assert_eq!(applied.data["playlist"]["maxSongsPerUser"], json!(5));
    }

    #[test]
    fn test_repeat_setting_reaches_playback() {
        let mut state = state();
        let plaid = state.playlists().current_plaid();
        add(&mut state, plaid, "kara-1");
        let patch = SettingsPatch {
            karaoke: Some(KaraokePatch { repeat_playlist: Some(true), ..KaraokePatch::default() }),
            ..SettingsPatch::default()
        };
        state.apply(Command::UpdateSettings(patch)).unwrap();
        play(&mut state);

        state.apply(Command::Player { command: ControlCommand::Skip, options: None }).unwrap();
        assert!(state.player().is_playing());
        assert_eq!(state.player().current_song.as_ref().map(|s| s.kid.as_str()), Some("kara-1"));
    }

    #[test]
    fn test_quiz_lifecycle() {
        let mut state = state();
        let applied = state.apply(Command::StartQuiz).unwrap();
        assert!(state.player().quiz_running);
        let kinds: Vec<_> = applied.events.iter().map(|e| e.event).collect();
        assert_eq!(kinds, [EventType::PlayerStatus, EventType::QuizStart]);

        assert_eq!(state.apply(Command::ContinueQuizSong).unwrap().data, json!(true));
        assert_eq!(state.apply(Command::ContinueQuizSong).unwrap().data, json!(false));

        state
            .apply(Command::AnswerQuiz { nickname: "Alice".into(), answer: "Naruto".into() })
            .unwrap();
        let applied = state.apply(Command::StopQuiz).unwrap();
        assert!(!state.player().quiz_running);
        assert_eq!(applied.events[1].data, json!({"answers": {"Alice": "Naruto"}}));
    }

    #[test]
    fn test_import_pushes_imported_and_updated() {
        let mut state = state();
        let applied = state
            .apply(Command::ImportPlaylist { name: "Imported".into(), kids: vec!["a".into()] })
            .unwrap();
        assert_eq!(applied.data["name"], json!("Imported"));
        let kinds: Vec<_> = applied.events.iter().map(|e| e.event).collect();
        assert_eq!(kinds, [EventType::PlaylistImported, EventType::PlaylistsUpdated]);
    }

    #[test]
    fn test_unknown_playlist_is_not_found() {
        let mut state = state();
        let error = state.apply(Command::DeletePlaylist { plaid: 99 }).unwrap_err();
        assert_eq!(error.code, 404);
    }

    #[test]
    fn test_tick_pushes_time_position() {
        let mut state = state();
        let plaid = state.playlists().current_plaid();
        add(&mut state, plaid, "kara-1");
        play(&mut state);

        let events = state.tick(1.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, json!({"timeposition": 1.0}));
    }

    #[test]
    fn test_server_mode_change_logs() {
        let mut state = state();
        let applied = state.apply(Command::SetServerMode(ServerMode::Limited)).unwrap();
        assert_eq!(state.mode(), ServerMode::Limited);
        assert_eq!(applied.events[0].event, EventType::Log);
    }
}
