//! Request handling for the IPC server.

use encore_core::control::{validate_pitch, validate_speed, validate_volume};
use encore_core::error::Error;
use encore_core::{Command as Mutation, Role};
use encore_ipc::commands::{self, Command, CommandKind};
use encore_ipc::{AuthorizationGate, ErrorInfo, Request};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::sessions::Session;
use crate::state::DaemonState;

/// What the daemon loop should do with a request.
#[derive(Debug)]
pub enum Outcome {
    /// Answer immediately
    Reply(Result<Value, ErrorInfo>),
    /// Apply a mutation, then answer with its result
    Apply(Mutation),
}

impl From<ErrorInfo> for Outcome {
    fn from(error: ErrorInfo) -> Self {
        Self::Reply(Err(error))
    }
}

/// Handle an IPC request: authorize, decode, validate, and either answer it
/// or hand back the mutation to apply.
pub fn handle_request(
    gate: &AuthorizationGate,
    request: &Request,
    session: &Session,
    state: &DaemonState,
) -> Outcome {
    let definition = match gate.authorize(&request.name, session.role, state.mode()) {
        Ok(definition) => definition,
        Err(error) => return error.into(),
    };
    let body = if definition.has_body { request.body.as_ref() } else { None };
    debug!(command = definition.name, role = %session.role, "Dispatching command");

    match dispatch(definition.kind, body, session, state) {
        Ok(outcome) => outcome,
        Err(error) => error.into(),
    }
}

fn dispatch(
    kind: CommandKind,
    body: Option<&Value>,
    session: &Session,
    state: &DaemonState,
) -> Result<Outcome, ErrorInfo> {
    use CommandKind as K;

    let outcome = match kind {
        K::GetPlayerStatus => reply(state.player()),
        K::GetSettings => reply(state.settings()),
        K::GetPlaylists => reply(&state.playlists().list()),

        K::UpdateSettings => {
            let patch = decode::<commands::UpdateSettings>(body)?;
            patch.validate().map_err(invalid)?;
            Outcome::Apply(Mutation::UpdateSettings(patch))
        }
        K::SetServerMode => {
            let body = decode::<commands::SetServerMode>(body)?;
            Outcome::Apply(Mutation::SetServerMode(body.mode))
        }

        K::Play
        | K::Pause
        | K::StopNow
        | K::StopAfter
        | K::Skip
        | K::Prev
        | K::Mute
        | K::Unmute
        | K::ShowSubs
        | K::HideSubs
        | K::BlurVideo
        | K::UnblurVideo
        | K::ToggleFullscreen
        | K::ToggleAlwaysOnTop
        | K::ToggleBorders => player(kind, None)?,
        K::GoTo => {
            let position = decode::<commands::GoTo>(body)?.options;
            if !position.is_finite() || position < 0.0 {
                return Err(invalid(Error::InvalidPosition(position)));
            }
            player(kind, Some(position))?
        }
        K::SetVolume => {
            let volume = decode::<commands::SetVolume>(body)?.options;
            validate_volume(volume).map_err(invalid)?;
            player(kind, Some(volume))?
        }
        K::SetPitch => {
            let pitch = decode::<commands::SetPitch>(body)?.options;
            modifiers_enabled(state)?;
            validate_pitch(pitch).map_err(invalid)?;
            player(kind, Some(f64::from(pitch)))?
        }
        K::SetSpeed => {
            let speed = decode::<commands::SetSpeed>(body)?.options;
            modifiers_enabled(state)?;
            validate_speed(speed).map_err(invalid)?;
            player(kind, Some(f64::from(speed)))?
        }

        K::StartQuiz => {
            if !state.settings().karaoke.quiz_mode {
                return Err(ErrorInfo::bad_request("Quiz mode is disabled"));
            }
            Outcome::Apply(Mutation::StartQuiz)
        }
        K::StopQuiz => Outcome::Apply(Mutation::StopQuiz),
        K::ContinueQuizSong => Outcome::Apply(Mutation::ContinueQuizSong),
        K::AnswerQuiz => {
            let body = decode::<commands::AnswerQuiz>(body)?;
            if !state.player().quiz_active() {
                return Err(ErrorInfo::bad_request("No quiz is running"));
            }
            Outcome::Apply(Mutation::AnswerQuiz {
                nickname: session.nickname.clone(),
                answer: body.answer,
            })
        }

        K::CreatePlaylist => {
            let body = decode::<commands::CreatePlaylist>(body)?;
            Outcome::Apply(Mutation::CreatePlaylist { name: body.name })
        }
        K::ImportPlaylist => {
            let body = decode::<commands::ImportPlaylist>(body)?;
            Outcome::Apply(Mutation::ImportPlaylist { name: body.name, kids: body.karas })
        }
        K::AddKaraToPlaylist => {
            let body = decode::<commands::AddKaraToPlaylist>(body)?;
            known_playlist(state, body.plaid)?;
            within_quota(state, session, body.plaid)?;
            Outcome::Apply(Mutation::AddKaraToPlaylist {
                plaid: body.plaid,
                kid: body.kid,
                requester: session.nickname.clone(),
            })
        }
        K::DeletePlaylist => {
            let body = decode::<commands::DeletePlaylist>(body)?;
            known_playlist(state, body.plaid)?;
            if body.plaid == state.playlists().current_plaid() {
                return Err(ErrorInfo::bad_request("The current playlist cannot be deleted"));
            }
            Outcome::Apply(Mutation::DeletePlaylist { plaid: body.plaid })
        }
    };
    Ok(outcome)
}

fn reply<T: Serialize>(data: &T) -> Outcome {
    Outcome::Reply(serde_json::to_value(data).map_err(|e| ErrorInfo::internal(e.to_string())))
}

fn player(kind: CommandKind, options: Option<f64>) -> Result<Outcome, ErrorInfo> {
    let command = kind.control().ok_or_else(|| ErrorInfo::internal("Not a player command"))?;
    Ok(Outcome::Apply(Mutation::Player { command, options }))
}

/// Decode a command body. A missing body decodes as `null`, which only
/// parameterless commands accept.
fn decode<C: Command>(body: Option<&Value>) -> Result<C::Body, ErrorInfo> {
    serde_json::from_value(body.cloned().unwrap_or(Value::Null))
        .map_err(|e| ErrorInfo::bad_request(format!("Invalid body for {}: {e}", C::NAME)))
}

fn invalid(error: Error) -> ErrorInfo {
    ErrorInfo::bad_request(error.to_string())
}

fn modifiers_enabled(state: &DaemonState) -> Result<(), ErrorInfo> {
    if state.settings().player.pitch_and_speed_enabled {
        Ok(())
    } else {
        Err(ErrorInfo::bad_request("Pitch and speed changes are disabled"))
    }
}

/// Admins are exempt from the per-user song limit.
fn within_quota(state: &DaemonState, session: &Session, plaid: u32) -> Result<(), ErrorInfo> {
    let limit = state.settings().playlist.max_songs_per_user;
    if session.role >= Role::Admin || state.playlists().requested_by(plaid, &session.nickname) < limit {
        Ok(())
    } else {
        Err(ErrorInfo::bad_request(format!("Song limit of {limit} per user reached")))
    }
}

fn known_playlist(state: &DaemonState, plaid: u32) -> Result<(), ErrorInfo> {
    if state.playlists().contains(plaid) {
        Ok(())
    } else {
        Err(ErrorInfo::not_found(Error::PlaylistNotFound(plaid).to_string()))
    }
}
