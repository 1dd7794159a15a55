//! Authoritative player state.
//!
//! The engine simulates playback of the current playlist. Every mutation
//! returns the fields that changed, which the daemon broadcasts as a partial
//! `playerStatus` push.

use encore_core::control::ControlCommand;
use encore_core::player::{CurrentSong, MediaType, PlayerState, PlayerStatus};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Length assumed for songs, in seconds.
const SONG_DURATION: f64 = 240.0;
/// Length of bundled intermission media, in seconds.
const INTERMISSION_DURATION: f64 = 20.0;

/// Changed fields of a player state.
pub type Patch = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Nothing loaded; `next` is the playlist index Play starts from
    Idle { next: usize },
    Song(usize),
    Intermission { next: usize },
}

#[derive(Debug)]
pub struct PlayerEngine {
    state: PlayerState,
    slot: Slot,
    intermissions_played: usize,
    /// Wrap to the first song at the end of the playlist
    repeat: bool,
}

impl PlayerEngine {
    pub fn new(volume: f64, repeat: bool) -> Self {
        Self {
            state: PlayerState { volume, ..PlayerState::default() },
            slot: Slot::Idle { next: 0 },
            intermissions_played: 0,
            repeat,
        }
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Run a mutation and collect the fields it changed.
    fn track(&mut self, mutate: impl FnOnce(&mut Self)) -> Patch {
        let before = serde_json::to_value(&self.state).unwrap_or_default();
        mutate(self);
        let after = serde_json::to_value(&self.state).unwrap_or_default();
        diff(&before, &after)
    }

    /// Apply a player command. Options have already been validated.
    #[allow(clippy::cast_possible_truncation)]
    pub fn control(
        &mut self,
        command: ControlCommand,
        options: Option<f64>,
        queue: &[String],
    ) -> Patch {
        debug!(?command, ?options, "Player command");
        self.track(|engine| match command {
            ControlCommand::Play => engine.play(queue),
            ControlCommand::Pause => {
                if engine.state.is_playing() {
                    engine.state.player_status = PlayerStatus::Pause;
                }
            }
            ControlCommand::StopNow => engine.stop(),
            ControlCommand::StopAfter => {
                if !engine.state.is_stopped() {
                    engine.state.stopping = true;
                }
            }
            ControlCommand::Skip => engine.step(queue, true),
            ControlCommand::Prev => engine.step(queue, false),
            ControlCommand::GoTo => {
                if let Some(position) = options {
                    engine.state.timeposition = position.min(engine.duration());
                }
            }
            ControlCommand::Mute => engine.state.mute = true,
            ControlCommand::Unmute => engine.state.mute = false,
            ControlCommand::ShowSubs => engine.state.show_subs = true,
            ControlCommand::HideSubs => engine.state.show_subs = false,
            ControlCommand::SetVolume => {
                if let Some(volume) = options {
                    engine.state.volume = volume;
                }
            }
            ControlCommand::SetPitch => {
                if let Some(pitch) = options {
                    engine.state.pitch = pitch as i32;
                    engine.state.speed = encore_core::control::SPEED_RESET;
                }
            }
            ControlCommand::SetSpeed => {
                if let Some(speed) = options {
                    engine.state.speed = speed as i32;
                    engine.state.pitch = encore_core::control::PITCH_RESET;
                }
            }
            ControlCommand::BlurVideo => engine.state.blur_video = true,
            ControlCommand::UnblurVideo => engine.state.blur_video = false,
            ControlCommand::ToggleFullscreen => engine.state.fullscreen = !engine.state.fullscreen,
            ControlCommand::ToggleAlwaysOnTop => engine.state.on_top = !engine.state.on_top,
            ControlCommand::ToggleBorders => engine.state.border = !engine.state.border,
        })
    }

    pub fn set_quiz_running(&mut self, running: bool) -> Patch {
        self.track(|engine| engine.state.quiz_running = running)
    }

    /// Advance playback by `elapsed` seconds of wall time.
    pub fn tick(&mut self, elapsed: f64, queue: &[String], intermission: &[MediaType]) -> Patch {
        if !self.state.is_playing() {
            return Patch::new();
        }
        self.track(|engine| {
            engine.state.timeposition += elapsed * f64::from(engine.state.speed) / 100.0;
            if engine.state.timeposition >= engine.duration() {
                engine.end_of_media(queue, intermission);
            }
        })
    }

    fn duration(&self) -> f64 {
        match self.slot {
            Slot::Song(_) => self.state.current_song.as_ref().map_or(SONG_DURATION, |s| s.duration),
            Slot::Intermission { .. } => INTERMISSION_DURATION,
            Slot::Idle { .. } => 0.0,
        }
    }

    fn play(&mut self, queue: &[String]) {
        match self.state.player_status {
            PlayerStatus::Play => {}
            PlayerStatus::Pause => self.state.player_status = PlayerStatus::Play,
            PlayerStatus::Stop => {
                let next = match self.slot {
                    Slot::Idle { next } | Slot::Intermission { next } => next,
                    Slot::Song(index) => index,
                };
                self.load(queue, next);
            }
        }
    }

    fn stop(&mut self) {
        let next = match self.slot {
            Slot::Idle { next } | Slot::Intermission { next } => next,
            Slot::Song(index) => index + 1,
        };
        self.slot = Slot::Idle { next };
        self.state.player_status = PlayerStatus::Stop;
        self.state.stopping = false;
        self.state.timeposition = 0.0;
        self.state.current_song = None;
        self.state.media_type = MediaType::Song;
    }

    fn step(&mut self, queue: &[String], forward: bool) {
        let target = match (self.slot, forward) {
            (Slot::Song(index), true) => Some(index + 1),
            (Slot::Song(index), false) => index.checked_sub(1),
            (Slot::Intermission { next } | Slot::Idle { next }, true) => Some(next),
            (Slot::Intermission { next } | Slot::Idle { next }, false) => next.checked_sub(1),
        };
        match target {
            Some(index) => self.load(queue, index),
            None => debug!("Already at the start of the playlist"),
        }
    }

    fn load(&mut self, queue: &[String], index: usize) {
        if index >= queue.len() && index > 0 && self.repeat {
            info!("End of playlist, starting over");
            self.load(queue, 0);
            return;
        }
        let Some(kid) = queue.get(index) else {
            info!(index, "End of playlist");
            self.stop();
            self.slot = Slot::Idle { next: 0 };
            return;
        };
        info!(index, kid = %kid, "Loading song");
        self.slot = Slot::Song(index);
        self.state.current_song = Some(CurrentSong {
            kid: kid.clone(),
            plcid: u32::try_from(index + 1).ok(),
            title: kid.clone(),
            duration: SONG_DURATION,
            requested_by: None,
        });
        self.state.media_type = MediaType::Song;
        self.state.timeposition = 0.0;
        self.state.stopping = false;
        self.state.player_status = PlayerStatus::Play;
    }

    fn end_of_media(&mut self, queue: &[String], intermission: &[MediaType]) {
        let next = match self.slot {
            Slot::Song(index) => index + 1,
            Slot::Intermission { next } | Slot::Idle { next } => next,
        };
        if self.state.stopping {
            info!("Stopping after current media");
            self.stop();
            return;
        }
        match (self.slot, intermission.is_empty()) {
            (Slot::Song(_), false) => {
                let media = intermission[self.intermissions_played % intermission.len()];
                self.intermissions_played += 1;
                info!(?media, "Playing intermission media");
                self.slot = Slot::Intermission { next };
                self.state.current_song = None;
                self.state.media_type = media;
                self.state.timeposition = 0.0;
            }
            _ => self.load(queue, next),
        }
    }
}

/// Top-level keys of `after` whose values differ from `before`.
fn diff(before: &Value, after: &Value) -> Patch {
    match (before, after) {
        (Value::Object(before), Value::Object(after)) => after
            .iter()
            .filter(|(key, value)| before.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => Patch::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue() -> Vec<String> {
        vec!["kara-1".to_string(), "kara-2".to_string()]
    }

    #[test]
    fn test_patch_contains_only_changed_fields() {
        let mut engine = PlayerEngine::new(80.0, false);
        let patch = engine.control(ControlCommand::Mute, None, &queue());
        assert_eq!(Value::Object(patch), json!({"mute": true}));

        let patch = engine.control(ControlCommand::Mute, None, &queue());
        assert!(patch.is_empty());
    }

    #[test]
    fn test_play_loads_first_song() {
        let mut engine = PlayerEngine::new(80.0, false);
        let patch = engine.control(ControlCommand::Play, None, &queue());

        assert_eq!(patch["playerStatus"], json!("play"));
        assert_eq!(patch["currentSong"]["kid"], json!("kara-1"));
        assert!(engine.state().is_playing());
    }

    #[test]
    fn test_pitch_and_speed_reset_each_other() {
        let mut engine = PlayerEngine::new(80.0, false);
        engine.control(ControlCommand::SetSpeed, Some(150.0), &queue());
        let patch = engine.control(ControlCommand::SetPitch, Some(-2.0), &queue());

        assert_eq!(engine.state().pitch, -2);
        assert_eq!(engine.state().speed, 100);
        assert_eq!(Value::Object(patch), json!({"pitch": -2, "speed": 100}));
    }

    #[test]
    fn test_stop_after_takes_effect_at_end_of_song() {
        let mut engine = PlayerEngine::new(80.0, false);
        engine.control(ControlCommand::Play, None, &queue());
        engine.control(ControlCommand::StopAfter, None, &queue());
        assert!(engine.state().stopping);

        engine.tick(SONG_DURATION, &queue(), &[MediaType::Jingles]);
        assert!(engine.state().is_stopped());
        assert!(!engine.state().stopping);
    }

    #[test]
    fn test_intermission_between_songs() {
        let mut engine = PlayerEngine::new(80.0, false);
        engine.control(ControlCommand::Play, None, &queue());

        let patch = engine.tick(SONG_DURATION, &queue(), &[MediaType::Jingles]);
        assert_eq!(patch["mediaType"], json!("jingles"));
        assert!(engine.state().current_song.is_none());

        engine.tick(INTERMISSION_DURATION, &queue(), &[MediaType::Jingles]);
        assert!(engine.state().is_song());
        assert_eq!(engine.state().current_song.as_ref().map(|s| s.kid.as_str()), Some("kara-2"));
    }

    #[test]
    fn test_skip_past_end_stops() {
        let mut engine = PlayerEngine::new(80.0, false);
        engine.control(ControlCommand::Play, None, &queue());
        engine.control(ControlCommand::Skip, None, &queue());
        engine.control(ControlCommand::Skip, None, &queue());
        assert!(engine.state().is_stopped());
    }

    #[test]
    fn test_repeat_wraps_to_first_song() {
        let mut engine = PlayerEngine::new(80.0, true);
        engine.control(ControlCommand::Play, None, &queue());
        engine.control(ControlCommand::Skip, None, &queue());
        engine.tick(SONG_DURATION, &queue(), &[]);

        assert!(engine.state().is_playing());
        assert_eq!(engine.state().current_song.as_ref().map(|s| s.kid.as_str()), Some("kara-1"));
    }

    #[test]
    fn test_repeat_with_empty_playlist_stays_stopped() {
        let mut engine = PlayerEngine::new(80.0, true);
        engine.control(ControlCommand::Play, None, &[]);
        assert!(engine.state().is_stopped());
    }

    #[test]
    fn test_tick_scales_with_speed() {
        let mut engine = PlayerEngine::new(80.0, false);
        engine.control(ControlCommand::Play, None, &queue());
        engine.control(ControlCommand::SetSpeed, Some(200.0), &queue());
        let patch = engine.tick(1.0, &queue(), &[]);
        assert_eq!(patch["timeposition"], json!(2.0));
    }

    #[test]
    fn test_paused_player_does_not_tick() {
        let mut engine = PlayerEngine::new(80.0, false);
        engine.control(ControlCommand::Play, None, &queue());
        engine.control(ControlCommand::Pause, None, &queue());
        assert!(engine.tick(1.0, &queue(), &[]).is_empty());
    }
}
