//! Command contract registry.
//!
//! Every command the daemon accepts is declared once in the table at the
//! bottom of this module: wire name, body type, response type and
//! authorization policy. The table generates a marker type per command, the
//! exhaustive [`CommandKind`] enum used for dispatch, and the catalog the
//! [`CommandRegistry`] is built from. Only the wire name is ever transmitted.

use std::any::TypeId;
use std::collections::HashMap;

use encore_core::auth::AuthorizationPolicy;
use encore_core::control::ControlCommand;
use encore_core::player::PlayerState;
use encore_core::settings::{Settings, SettingsPatch};
use encore_core::ServerMode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A command with a statically known wire name and payload shapes.
pub trait Command {
    /// Wire name, unique across the registry
    const NAME: &'static str;
    /// Who may invoke the command
    const POLICY: AuthorizationPolicy;
    /// Request payload; `()` for parameterless commands
    type Body: Serialize + DeserializeOwned + Send + 'static;
    /// Success payload; `()` for commands without a result
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// Numeric option carried by player commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Options<T> {
    pub options: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerModeBody {
    pub mode: ServerMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistImport {
    pub name: String,
    /// Karaoke ids, in playlist order
    pub karas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KaraRef {
    pub plaid: u32,
    pub kid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub plaid: u32,
}

/// A playlist as returned by the playlist commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub plaid: u32,
    pub name: String,
    pub karas: Vec<String>,
}

/// Static description of a registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub kind: CommandKind,
    pub policy: AuthorizationPolicy,
    /// Whether the command expects a request body
    pub has_body: bool,
}

impl CommandDefinition {
    fn of<C: Command>(kind: CommandKind) -> Self {
        Self {
            name: C::NAME,
            kind,
            policy: C::POLICY,
            has_body: TypeId::of::<C::Body>() != TypeId::of::<()>(),
        }
    }
}

/// Registry construction error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Command name registered twice: {0}")]
    Duplicate(&'static str),
}

/// Lookup table from wire name to command definition.
///
/// Built once at startup; lookups only afterwards.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    definitions: HashMap<&'static str, CommandDefinition>,
}

impl CommandRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry holding every command in the catalog.
    ///
    /// # Errors
    /// Returns an error if two catalog entries share a wire name.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for kind in CommandKind::ALL {
            registry.define(kind.definition())?;
        }
        Ok(registry)
    }

    /// Register a command.
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if the name is already taken.
    pub fn define(
        &mut self,
        definition: CommandDefinition,
    ) -> Result<&CommandDefinition, RegistryError> {
        match self.definitions.entry(definition.name) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(RegistryError::Duplicate(definition.name))
            }
            std::collections::hash_map::Entry::Vacant(slot) => Ok(slot.insert(definition)),
        }
    }

    /// Look up a command by wire name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.definitions.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

macro_rules! commands {
    ($(
        $(#[$meta:meta])*
        $ty:ident => $name:literal {
            body: $body:ty,
            response: $response:ty,
            policy: $policy:expr $(,)?
        }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $ty;

            impl Command for $ty {
                const NAME: &'static str = $name;
                const POLICY: AuthorizationPolicy = $policy;
                type Body = $body;
                type Response = $response;
            }
        )*

        /// Every command in the catalog.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandKind {
            $($ty,)*
        }

        impl CommandKind {
            pub const ALL: &'static [CommandKind] = &[$(CommandKind::$ty,)*];

            /// Resolve a wire name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$ty),)*
                    _ => None,
                }
            }

            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$ty => <$ty as Command>::NAME,)*
                }
            }

            #[must_use]
            pub fn policy(self) -> AuthorizationPolicy {
                match self {
                    $(Self::$ty => <$ty as Command>::POLICY,)*
                }
            }

            #[must_use]
            pub fn definition(self) -> CommandDefinition {
                match self {
                    $(Self::$ty => CommandDefinition::of::<$ty>(self),)*
                }
            }
        }
    };
}

commands! {
    /// Full player state snapshot
    GetPlayerStatus => "getPlayerStatus" {
        body: (),
        response: PlayerState,
        policy: AuthorizationPolicy::PUBLIC,
    }
    GetSettings => "getSettings" {
        body: (),
        response: Settings,
        policy: AuthorizationPolicy::PUBLIC,
    }
    /// Apply a deep-partial settings patch; returns the resulting settings
    UpdateSettings => "updateSettings" {
        body: SettingsPatch,
        response: Settings,
        policy: AuthorizationPolicy::ADMIN_UNLIMITED,
    }
    SetServerMode => "setServerMode" {
        body: ServerModeBody,
        response: (),
        policy: AuthorizationPolicy::ADMIN,
    }

    Play => "play" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    Pause => "pause" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    StopNow => "stopNow" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    StopAfter => "stopAfter" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    Skip => "skip" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    Prev => "prev" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    /// Seek to a position in seconds
    GoTo => "goTo" { body: Options<f64>, response: (), policy: AuthorizationPolicy::ADMIN }
    Mute => "mute" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    Unmute => "unmute" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    ShowSubs => "showSubs" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    HideSubs => "hideSubs" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    /// Backend (perceptual) volume, 0-100
    SetVolume => "setVolume" { body: Options<f64>, response: (), policy: AuthorizationPolicy::ADMIN }
    SetPitch => "setPitch" { body: Options<i32>, response: (), policy: AuthorizationPolicy::ADMIN }
    SetSpeed => "setSpeed" { body: Options<i32>, response: (), policy: AuthorizationPolicy::ADMIN }
    BlurVideo => "blurVideo" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    UnblurVideo => "unblurVideo" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    ToggleFullscreen => "toggleFullscreen" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    ToggleAlwaysOnTop => "toggleAlwaysOnTop" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    ToggleBorders => "toggleBorders" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }

    StartQuiz => "startQuiz" { body: (), response: (), policy: AuthorizationPolicy::ADMIN_UNLIMITED }
    StopQuiz => "stopQuiz" { body: (), response: (), policy: AuthorizationPolicy::ADMIN }
    /// Flip the continue toggle; returns its new value
    ContinueQuizSong => "continueQuizSong" { body: (), response: bool, policy: AuthorizationPolicy::ADMIN }
    AnswerQuiz => "answerQuiz" { body: QuizAnswer, response: (), policy: AuthorizationPolicy::USER }

    GetPlaylists => "getPlaylists" {
        body: (),
        response: Vec<PlaylistSummary>,
        policy: AuthorizationPolicy::PUBLIC,
    }
    CreatePlaylist => "createPlaylist" {
        body: PlaylistName,
        response: PlaylistSummary,
        policy: AuthorizationPolicy::ADMIN,
    }
    ImportPlaylist => "importPlaylist" {
        body: PlaylistImport,
        response: PlaylistSummary,
        policy: AuthorizationPolicy::ADMIN_UNLIMITED,
    }
    AddKaraToPlaylist => "addKaraToPlaylist" {
        body: KaraRef,
        response: (),
        policy: AuthorizationPolicy::USER,
    }
    DeletePlaylist => "deletePlaylist" {
        body: PlaylistRef,
        response: (),
        policy: AuthorizationPolicy::ADMIN_UNLIMITED,
    }
}

impl From<ControlCommand> for CommandKind {
    fn from(command: ControlCommand) -> Self {
        match command {
            ControlCommand::Play => Self::Play,
            ControlCommand::Pause => Self::Pause,
            ControlCommand::StopNow => Self::StopNow,
            ControlCommand::StopAfter => Self::StopAfter,
            ControlCommand::Skip => Self::Skip,
            ControlCommand::Prev => Self::Prev,
            ControlCommand::GoTo => Self::GoTo,
            ControlCommand::Mute => Self::Mute,
            ControlCommand::Unmute => Self::Unmute,
            ControlCommand::ShowSubs => Self::ShowSubs,
            ControlCommand::HideSubs => Self::HideSubs,
            ControlCommand::SetVolume => Self::SetVolume,
            ControlCommand::SetPitch => Self::SetPitch,
            ControlCommand::SetSpeed => Self::SetSpeed,
            ControlCommand::BlurVideo => Self::BlurVideo,
            ControlCommand::UnblurVideo => Self::UnblurVideo,
            ControlCommand::ToggleFullscreen => Self::ToggleFullscreen,
            ControlCommand::ToggleAlwaysOnTop => Self::ToggleAlwaysOnTop,
            ControlCommand::ToggleBorders => Self::ToggleBorders,
        }
    }
}

impl CommandKind {
    /// The player control this command drives, if any.
    #[must_use]
    pub fn control(self) -> Option<ControlCommand> {
        Some(match self {
            Self::Play => ControlCommand::Play,
            Self::Pause => ControlCommand::Pause,
            Self::StopNow => ControlCommand::StopNow,
            Self::StopAfter => ControlCommand::StopAfter,
            Self::Skip => ControlCommand::Skip,
            Self::Prev => ControlCommand::Prev,
            Self::GoTo => ControlCommand::GoTo,
            Self::Mute => ControlCommand::Mute,
            Self::Unmute => ControlCommand::Unmute,
            Self::ShowSubs => ControlCommand::ShowSubs,
            Self::HideSubs => ControlCommand::HideSubs,
            Self::SetVolume => ControlCommand::SetVolume,
            Self::SetPitch => ControlCommand::SetPitch,
            Self::SetSpeed => ControlCommand::SetSpeed,
            Self::BlurVideo => ControlCommand::BlurVideo,
            Self::UnblurVideo => ControlCommand::UnblurVideo,
            Self::ToggleFullscreen => ControlCommand::ToggleFullscreen,
            Self::ToggleAlwaysOnTop => ControlCommand::ToggleAlwaysOnTop,
            Self::ToggleBorders => ControlCommand::ToggleBorders,
            _ => return None,
        })
    }
}
