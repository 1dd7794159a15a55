//! Commands for state mutations.
//!
//! Commands are returned by request handlers once a request has been
//! authorized and validated, so that the daemon loop can apply them with
//! mutable access to its state.

use crate::auth::ServerMode;
use crate::control::ControlCommand;
use crate::settings::SettingsPatch;

/// A command representing a state mutation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Drive the player
    Player { command: ControlCommand, options: Option<f64> },
    /// Apply a settings patch
    UpdateSettings(SettingsPatch),
    /// Switch the server operating mode
    SetServerMode(ServerMode),
    StartQuiz,
    StopQuiz,
    /// Flip the quiz continue toggle
    ContinueQuizSong,
    /// Record a quiz answer for a session
    AnswerQuiz { nickname: String, answer: String },
    CreatePlaylist { name: String },
    ImportPlaylist { name: String, kids: Vec<String> },
    AddKaraToPlaylist { plaid: u32, kid: String, requester: String },
    DeletePlaylist { plaid: u32 },
}
