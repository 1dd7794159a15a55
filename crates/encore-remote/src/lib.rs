//! Encore Remote - Player state synchronization for control surfaces.
//!
//! A surface mounts on an [`encore_ipc::IpcClient`], keeps its own
//! projection of the daemon's player state current from push events, and
//! maps user gestures to player commands.

pub mod error;
pub mod surface;
pub mod sync;

#[cfg(test)]
mod testing;

pub use error::{RemoteError, RemoteResult};
pub use surface::RemoteSurface;
pub use sync::PlayerStateSync;
