//! Remote control surface.
//!
//! Turns user gestures into daemon commands. Which command a gesture sends
//! is decided from the synchronized player state at the moment of the
//! gesture. Invocations are fire-and-forget: failures are logged and
//! dropped here, since authorization and connectivity failures already
//! reach every surface through [`IpcClient::notices`]. The quiz continue
//! toggle is the exception because the surface needs its answer.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use encore_core::control::{self, Binding, Gesture, Modifiers, StopVariant, VolumeSlider};
use encore_core::{ControlCommand, DisplayToggle, PlayerState, Settings, SettingsPatch};
use encore_ipc::commands::{self, Command, Options};
use encore_ipc::{CommandKind, EventType, IpcClient, IpcResult, Subscription};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::sync::PlayerStateSync;

/// One control surface bound to a daemon connection.
pub struct RemoteSurface {
    client: Arc<IpcClient>,
    sync: PlayerStateSync,
    settings: Arc<ArcSwap<Settings>>,
    quiz_continue: Arc<AtomicBool>,
    slider: Mutex<VolumeSlider>,
    _subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for RemoteSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSurface").field("sync", &self.sync).finish_non_exhaustive()
    }
}

impl RemoteSurface {
    /// Mount a surface: start following player and settings pushes, fetch
    /// the settings and bootstrap the player state.
    ///
    /// Fetch failures are logged; the surface then starts from defaults and
    /// catches up with the next pushes.
    pub async fn mount(client: Arc<IpcClient>) -> Self {
        let sync = PlayerStateSync::attach(&client);
        let settings = Arc::new(ArcSwap::from_pointee(Settings::default()));
        let quiz_continue = Arc::new(AtomicBool::new(false));

        let on_settings = client.on(EventType::SettingsUpdated, {
            let settings = Arc::clone(&settings);
            move |push| apply_settings_push(&settings, push)
        });
        let on_quiz_stop = client.on(EventType::QuizStop, {
            let quiz_continue = Arc::clone(&quiz_continue);
            move |_| quiz_continue.store(false, Ordering::Release)
        });

        match client.invoke::<commands::GetSettings>(()).await {
            Ok(fetched) => settings.store(Arc::new(fetched)),
            Err(e) => warn!(error = %e, "Failed to fetch settings"),
        }
        if let Err(e) = sync.bootstrap(&client).await {
            warn!(error = %e, "Failed to bootstrap player state");
        }

        Self {
            client,
            sync,
            settings,
            quiz_continue,
            slider: Mutex::new(VolumeSlider::default()),
            _subscriptions: vec![on_settings, on_quiz_stop],
        }
    }

    #[must_use]
    pub fn sync(&self) -> &PlayerStateSync {
        &self.sync
    }

    #[must_use]
    pub fn state(&self) -> Arc<PlayerState> {
        self.sync.read()
    }

    #[must_use]
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    #[must_use]
    pub fn classic_mode(&self) -> bool {
        self.settings.load().karaoke.classic_mode
    }

    /// Which stop the stop button currently issues.
    #[must_use]
    pub fn stop_variant(&self) -> StopVariant {
        StopVariant::select(&self.state(), self.classic_mode())
    }

    /// Slider position for the current backend volume.
    #[must_use]
    pub fn volume_slider(&self) -> f64 {
        let mut slider = self.slider.lock();
        slider.sync(self.state().volume);
        slider.value()
    }

    /// Last answer of the quiz continue toggle.
    #[must_use]
    pub fn quiz_continue(&self) -> bool {
        self.quiz_continue.load(Ordering::Acquire)
    }

    pub async fn toggle_play(&self) {
        self.gesture(Gesture::PlayPause).await;
    }

    pub async fn stop(&self) {
        self.gesture(Gesture::Stop).await;
    }

    pub async fn skip(&self) {
        self.gesture(Gesture::Skip).await;
    }

    pub async fn prev(&self) {
        self.gesture(Gesture::Previous).await;
    }

    pub async fn toggle_mute(&self) {
        self.gesture(Gesture::Mute).await;
    }

    pub async fn toggle_subs(&self) {
        self.gesture(Gesture::Subtitles).await;
    }

    pub async fn toggle_blur(&self) {
        self.gesture(Gesture::Blur).await;
    }

    pub async fn toggle_display(&self, toggle: DisplayToggle) {
        self.gesture(Gesture::Display(toggle)).await;
    }

    /// Rewind to the start of the song, or flip the quiz continue toggle
    /// while a quiz runs.
    ///
    /// # Errors
    /// Returns the error of the quiz continue invocation. Rewinds never fail.
    pub async fn rewind_or_continue(&self) -> IpcResult<()> {
        match control::resolve(Gesture::Rewind, &self.state(), self.classic_mode()) {
            Binding::QuizContinue => {
                let value = self.client.invoke::<commands::ContinueQuizSong>(()).await?;
                self.quiz_continue.store(value, Ordering::Release);
                Ok(())
            }
            Binding::Player { command, options } => {
                self.send(command, options).await;
                Ok(())
            }
        }
    }

    /// Send the backend volume for a slider position.
    pub async fn set_volume_from_slider(&self, raw: f64) {
        let Some(volume) = control::backend_from_ui(raw.clamp(0.0, 100.0)) else {
            debug!(raw, "Slider value has no backend volume");
            return;
        };
        fire(
            commands::SetVolume::NAME,
            self.client.invoke::<commands::SetVolume>(Options { options: volume }).await,
        );
    }

    /// Shift pitch by `delta` semitones, or reset it with `None`.
    ///
    /// Out-of-range adjustments send nothing. Accepted ones are predicted
    /// locally before the daemon confirms them.
    pub async fn adjust_pitch(&self, delta: Option<i32>) {
        let Some(next) = Modifiers::from_state(&self.state()).adjust_pitch(delta) else {
            debug!(?delta, "Pitch adjustment out of range");
            return;
        };
        self.predict(next);
        fire(
            commands::SetPitch::NAME,
            self.client.invoke::<commands::SetPitch>(Options { options: next.pitch }).await,
        );
    }

    /// Shift speed by `delta` percent, or reset it with `None`.
    pub async fn adjust_speed(&self, delta: Option<i32>) {
        let Some(next) = Modifiers::from_state(&self.state()).adjust_speed(delta) else {
            debug!(?delta, "Speed adjustment out of range");
            return;
        };
        self.predict(next);
        fire(
            commands::SetSpeed::NAME,
            self.client.invoke::<commands::SetSpeed>(Options { options: next.speed }).await,
        );
    }

    fn predict(&self, modifiers: Modifiers) {
        self.sync.apply_push(&json!({ "pitch": modifiers.pitch, "speed": modifiers.speed }));
    }

    async fn gesture(&self, gesture: Gesture) {
        match control::resolve(gesture, &self.state(), self.classic_mode()) {
            Binding::Player { command, options } => self.send(command, options).await,
            Binding::QuizContinue => {
                if let Err(e) = self.rewind_or_continue().await {
                    debug!(error = %e, "Quiz continue failed");
                }
            }
        }
    }

    async fn send(&self, command: ControlCommand, options: Option<f64>) {
        let name = CommandKind::from(command).name();
        let body = options.map(|options| json!({ "options": options }));
        fire(name, self.client.invoke_raw(name, body).await);
    }
}

fn fire<T: Debug>(command: &str, result: IpcResult<T>) {
    match result {
        Ok(data) => debug!(command, ?data, "Command accepted"),
        Err(e) => debug!(command, error = %e, "Command failed"),
    }
}

fn apply_settings_push(settings: &ArcSwap<Settings>, push: &Value) {
    let patch = match serde_json::from_value::<SettingsPatch>(push.clone()) {
        Ok(patch) => patch,
        Err(e) => {
            warn!(error = %e, "Dropping malformed settings push");
            return;
        }
    };
    settings.rcu(|current| {
        let mut next = Settings::clone(current);
        next.apply(patch.clone());
        next
    });
}
