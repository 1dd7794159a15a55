//! Player control vocabulary and the rules that turn gestures into commands.
//!
//! Everything here is computed from the latest [`PlayerState`] on every call;
//! nothing is cached between renders.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::player::PlayerState;

/// Exponent of the perceptual volume curve.
pub const VOLUME_EXPONENT: f64 = 0.76;
/// Full-scale value on both the slider and the backend.
pub const VOLUME_BASE: f64 = 100.0;

pub const PITCH_MIN: i32 = -6;
pub const PITCH_MAX: i32 = 6;
pub const PITCH_STEP: i32 = 1;
pub const PITCH_RESET: i32 = 0;

pub const SPEED_MIN: i32 = 25;
pub const SPEED_MAX: i32 = 200;
pub const SPEED_STEP: i32 = 25;
pub const SPEED_RESET: i32 = 100;

/// A player command. Each one has its own wire command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlCommand {
    Play,
    Pause,
    StopNow,
    StopAfter,
    Skip,
    Prev,
    GoTo,
    Mute,
    Unmute,
    ShowSubs,
    HideSubs,
    SetVolume,
    SetPitch,
    SetSpeed,
    BlurVideo,
    UnblurVideo,
    ToggleFullscreen,
    ToggleAlwaysOnTop,
    ToggleBorders,
}

/// Player window toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayToggle {
    Fullscreen,
    AlwaysOnTop,
    Borders,
}

impl DisplayToggle {
    #[must_use]
    pub fn command(self) -> ControlCommand {
        match self {
            Self::Fullscreen => ControlCommand::ToggleFullscreen,
            Self::AlwaysOnTop => ControlCommand::ToggleAlwaysOnTop,
            Self::Borders => ControlCommand::ToggleBorders,
        }
    }
}

/// Map a slider value (linear 0-100) to the backend's perceptual volume.
///
/// Returns `None` when the result is not a finite number.
#[must_use]
pub fn backend_from_ui(raw: f64) -> Option<f64> {
    let volume = raw.powf(VOLUME_EXPONENT) / VOLUME_BASE.powf(VOLUME_EXPONENT) * VOLUME_BASE;
    volume.is_finite().then_some(volume)
}

/// Map a backend volume back to the slider scale. Inverse of [`backend_from_ui`].
#[must_use]
pub fn ui_from_backend(volume: f64) -> Option<f64> {
    let raw = VOLUME_BASE * (volume / VOLUME_BASE).powf(1.0 / VOLUME_EXPONENT);
    raw.is_finite().then_some(raw)
}

/// Slider position derived from backend volume pushes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSlider {
    value: f64,
}

impl Default for VolumeSlider {
    fn default() -> Self {
        Self { value: VOLUME_BASE }
    }
}

impl VolumeSlider {
    /// Follow a backend volume; an unmappable value keeps the previous position.
    pub fn sync(&mut self, backend_volume: f64) {
        if let Some(value) = ui_from_backend(backend_volume) {
            self.value = value;
        }
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Check a backend volume sent by a client.
///
/// # Errors
/// Returns [`Error::InvalidVolume`] outside `0..=100`.
pub fn validate_volume(volume: f64) -> Result<()> {
    if (0.0..=VOLUME_BASE).contains(&volume) {
        Ok(())
    } else {
        Err(Error::InvalidVolume(volume))
    }
}

/// Check a pitch sent by a client.
///
/// # Errors
/// Returns [`Error::PitchOutOfRange`] outside `-6..=6`.
pub fn validate_pitch(pitch: i32) -> Result<()> {
    if (PITCH_MIN..=PITCH_MAX).contains(&pitch) {
        Ok(())
    } else {
        Err(Error::PitchOutOfRange(pitch))
    }
}

/// Check a speed sent by a client.
///
/// # Errors
/// Returns [`Error::SpeedOutOfRange`] outside `25..=200`.
pub fn validate_speed(speed: i32) -> Result<()> {
    if (SPEED_MIN..=SPEED_MAX).contains(&speed) {
        Ok(())
    } else {
        Err(Error::SpeedOutOfRange(speed))
    }
}

/// Pitch and speed, the two mutually exclusive experimental modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modifiers {
    pub pitch: i32,
    pub speed: i32,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self { pitch: PITCH_RESET, speed: SPEED_RESET }
    }
}

impl Modifiers {
    #[must_use]
    pub fn from_state(state: &PlayerState) -> Self {
        Self { pitch: state.pitch, speed: state.speed }
    }

    /// Predict the modifiers after a pitch adjustment.
    ///
    /// `None` as delta resets pitch. Returns `None` when the adjustment would
    /// leave `[-6, 6]`. Any accepted change resets speed.
    #[must_use]
    pub fn adjust_pitch(self, delta: Option<i32>) -> Option<Self> {
        let pitch = match delta {
            None => PITCH_RESET,
            Some(delta) => self.pitch.checked_add(delta)?,
        };
        validate_pitch(pitch).ok()?;
        Some(Self { pitch, speed: SPEED_RESET })
    }

    /// Predict the modifiers after a speed adjustment.
    ///
    /// `None` as delta resets speed. Returns `None` when the adjustment would
    /// leave `[25, 200]`. Any accepted change resets pitch.
    #[must_use]
    pub fn adjust_speed(self, delta: Option<i32>) -> Option<Self> {
        let speed = match delta {
            None => SPEED_RESET,
            Some(delta) => self.speed.checked_add(delta)?,
        };
        validate_speed(speed).ok()?;
        Some(Self { pitch: PITCH_RESET, speed })
    }
}

/// Which stop command a stop gesture issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopVariant {
    /// Interrupt immediately
    Now,
    /// Stop once the current song ends
    After,
}

impl StopVariant {
    /// Select the stop variant for the current state.
    ///
    /// Stop-now applies when a stop is already pending, when bundled media is
    /// playing, or when classic mode is on.
    #[must_use]
    pub fn select(state: &PlayerState, classic_mode: bool) -> Self {
        if state.stopping || !state.is_song() || classic_mode {
            Self::Now
        } else {
            Self::After
        }
    }

    #[must_use]
    pub fn command(self) -> ControlCommand {
        match self {
            Self::Now => ControlCommand::StopNow,
            Self::After => ControlCommand::StopAfter,
        }
    }
}

/// A user gesture on a control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    PlayPause,
    Stop,
    Skip,
    Previous,
    /// Rewind button; becomes the quiz continue toggle while a quiz runs
    Rewind,
    Mute,
    Subtitles,
    Blur,
    Display(DisplayToggle),
}

/// What a gesture dispatches to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding {
    Player { command: ControlCommand, options: Option<f64> },
    QuizContinue,
}

impl Binding {
    fn player(command: ControlCommand) -> Self {
        Self::Player { command, options: None }
    }
}

/// Resolve a gesture against the live state.
#[must_use]
pub fn resolve(gesture: Gesture, state: &PlayerState, classic_mode: bool) -> Binding {
    match gesture {
        Gesture::PlayPause if state.is_playing() => Binding::player(ControlCommand::Pause),
        Gesture::PlayPause => Binding::player(ControlCommand::Play),
        Gesture::Stop => Binding::player(StopVariant::select(state, classic_mode).command()),
        Gesture::Skip => Binding::player(ControlCommand::Skip),
        Gesture::Previous => Binding::player(ControlCommand::Prev),
        Gesture::Rewind if state.quiz_active() => Binding::QuizContinue,
        Gesture::Rewind => Binding::Player { command: ControlCommand::GoTo, options: Some(0.0) },
        Gesture::Mute if state.mute => Binding::player(ControlCommand::Unmute),
        Gesture::Mute => Binding::player(ControlCommand::Mute),
        Gesture::Subtitles if state.show_subs => Binding::player(ControlCommand::HideSubs),
        Gesture::Subtitles => Binding::player(ControlCommand::ShowSubs),
        Gesture::Blur if state.blur_video => Binding::player(ControlCommand::UnblurVideo),
        Gesture::Blur => Binding::player(ControlCommand::BlurVideo),
        Gesture::Display(toggle) => Binding::player(toggle.command()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{MediaType, PlayerStatus};
    use proptest::prelude::*;

    fn close(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_volume_curve_endpoints() {
        assert!(close(backend_from_ui(0.0).unwrap(), 0.0, 1e-9));
        assert!(close(backend_from_ui(100.0).unwrap(), 100.0, 1e-9));
        assert!(close(ui_from_backend(100.0).unwrap(), 100.0, 1e-9));
    }

    #[test]
    fn test_volume_slider_66_round_trip() {
        let backend = backend_from_ui(66.0).unwrap();
        assert!(close(backend, 72.9, 0.1), "backend volume was {backend}");
        let mut slider = VolumeSlider::default();
        slider.sync(backend);
        assert!(close(slider.value(), 66.0, 0.5));
    }

    #[test]
    fn test_negative_volume_is_unmappable() {
        assert_eq!(backend_from_ui(-5.0), None);
        assert_eq!(ui_from_backend(-5.0), None);
    }

    #[test]
    fn test_slider_keeps_previous_on_nan() {
        let mut slider = VolumeSlider::default();
        slider.sync(50.0);
        let before = slider.value();
        slider.sync(-1.0);
        slider.sync(f64::NAN);
        assert!(close(slider.value(), before, f64::EPSILON));
    }

    #[test]
    fn test_pitch_clamps_at_upper_bound() {
        let start = Modifiers { pitch: 5, speed: 100 };
        let once = start.adjust_pitch(Some(1)).unwrap();
        assert_eq!(once.pitch, 6);
        assert_eq!(once.adjust_pitch(Some(1)), None);
    }

    #[test]
    fn test_pitch_reset_also_resets_speed() {
        let start = Modifiers { pitch: 4, speed: 150 };
        assert_eq!(start.adjust_pitch(None), Some(Modifiers { pitch: 0, speed: 100 }));
    }

    #[test]
    fn test_speed_boundaries() {
        let at_190 = Modifiers { pitch: 0, speed: 190 };
        assert_eq!(at_190.adjust_speed(Some(25)), None);

        let at_175 = Modifiers { pitch: 2, speed: 175 };
        assert_eq!(at_175.adjust_speed(Some(25)), Some(Modifiers { pitch: 0, speed: 200 }));

        let at_25 = Modifiers { pitch: 0, speed: 25 };
        assert_eq!(at_25.adjust_speed(Some(-25)), None);
        assert_eq!(at_25.adjust_speed(None), Some(Modifiers { pitch: 0, speed: 100 }));
    }

    #[test]
    fn test_stop_selection() {
        let song = PlayerState::default();
        assert_eq!(StopVariant::select(&song, false), StopVariant::After);

        let stopping = PlayerState { stopping: true, ..PlayerState::default() };
        assert_eq!(StopVariant::select(&stopping, false), StopVariant::Now);

        let jingle = PlayerState { media_type: MediaType::Jingles, ..PlayerState::default() };
        assert_eq!(StopVariant::select(&jingle, false), StopVariant::Now);

        assert_eq!(StopVariant::select(&song, true), StopVariant::Now);
    }

    #[test]
    fn test_rewind_binding_follows_quiz_flag() {
        let mut state = PlayerState::default();
        assert_eq!(
            resolve(Gesture::Rewind, &state, false),
            Binding::Player { command: ControlCommand::GoTo, options: Some(0.0) }
        );
        state.quiz_running = true;
        assert_eq!(resolve(Gesture::Rewind, &state, false), Binding::QuizContinue);
    }

    #[test]
    fn test_toggles_follow_state() {
        let mut state = PlayerState { player_status: PlayerStatus::Play, ..PlayerState::default() };
        assert_eq!(resolve(Gesture::PlayPause, &state, false), Binding::player(ControlCommand::Pause));
        assert_eq!(resolve(Gesture::Subtitles, &state, false), Binding::player(ControlCommand::HideSubs));
        state.mute = true;
        assert_eq!(resolve(Gesture::Mute, &state, false), Binding::player(ControlCommand::Unmute));
        assert_eq!(
            resolve(Gesture::Display(DisplayToggle::Borders), &state, false),
            Binding::player(ControlCommand::ToggleBorders)
        );
    }

    proptest! {
        #[test]
        fn prop_volume_round_trip(v in 1.0f64..=100.0) {
            let back = ui_from_backend(backend_from_ui(v).unwrap()).unwrap();
            prop_assert!((back - v).abs() < 1e-6);
        }
    }
}
