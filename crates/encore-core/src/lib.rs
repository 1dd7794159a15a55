//! Encore Core - Player state, authorization policy and control semantics.
//!
//! This crate contains the domain models and rules shared between the
//! daemon and the remote control surfaces. It performs no I/O.

pub mod auth;
pub mod command;
pub mod control;
pub mod error;
pub mod player;
pub mod projection;
pub mod settings;

pub use auth::{AuthorizationPolicy, Denial, ModeRequirement, Role, ServerMode};
pub use command::Command;
pub use control::{Binding, ControlCommand, DisplayToggle, Gesture, Modifiers, StopVariant, VolumeSlider};
pub use error::{Error, Result};
pub use player::{CurrentSong, MediaType, PlayerState, PlayerStatus};
pub use projection::{MergeError, Projection};
pub use settings::{Settings, SettingsPatch};
