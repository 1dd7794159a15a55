//! Error types for remote surfaces.

use encore_ipc::IpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Ipc(#[from] IpcError),

    /// The daemon answered with a state that does not match the schema.
    #[error("Invalid player snapshot: {0}")]
    Snapshot(#[from] encore_core::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
