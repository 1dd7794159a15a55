//! Error types for Encore core.

use thiserror::Error;

/// Core error type for Encore operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid volume value: {0} (must be 0-100)")]
    InvalidVolume(f64),

    #[error("Pitch out of range: {0} (must be -6 to 6)")]
    PitchOutOfRange(i32),

    #[error("Speed out of range: {0} (must be 25-200)")]
    SpeedOutOfRange(i32),

    #[error("Invalid position: {0}")]
    InvalidPosition(f64),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("Playlist not found: {0}")]
    PlaylistNotFound(u32),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type alias for Encore core operations.
pub type Result<T> = std::result::Result<T, Error>;
