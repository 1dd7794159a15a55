//! Player state synchronizer.
//!
//! Each surface owns one [`PlayerStateSync`]. It merges the daemon's partial
//! `playerStatus` pushes into a [`Projection`] and publishes every merged
//! state as an immutable snapshot, so readers never hold a lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use encore_core::{MergeError, PlayerState, Projection};
use encore_ipc::commands::{Command, GetPlayerStatus};
use encore_ipc::{ConnectionStatus, EventType, IpcClient, Subscription};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::RemoteResult;

#[derive(Default)]
struct Track {
    projection: Projection,
    /// Bootstraps waiting for their snapshot
    bootstraps: usize,
    /// Pushes received while a bootstrap is in flight, replayed over its snapshot
    backlog: Vec<Value>,
}

struct Shared {
    track: Mutex<Track>,
    snapshot: ArcSwap<PlayerState>,
    stale: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            track: Mutex::new(Track::default()),
            snapshot: ArcSwap::from_pointee(PlayerState::default()),
            stale: AtomicBool::new(false),
        }
    }

    fn apply_push(&self, push: &Value) -> Vec<MergeError> {
        let mut track = self.track.lock();
        if track.bootstraps > 0 {
            track.backlog.push(push.clone());
        }
        let errors = track.projection.apply_push(push);
        self.publish(&track.projection);
        errors
    }

    fn publish(&self, projection: &Projection) {
        self.snapshot.store(Arc::new(projection.state().clone()));
        self.stale.store(false, Ordering::Release);
    }
}

/// Marks a bootstrap in flight for as long as it lives.
struct Bootstrapping<'a>(&'a Shared);

impl<'a> Bootstrapping<'a> {
    fn start(shared: &'a Shared) -> Self {
        shared.track.lock().bootstraps += 1;
        Self(shared)
    }
}

impl Drop for Bootstrapping<'_> {
    fn drop(&mut self) {
        let mut track = self.0.track.lock();
        track.bootstraps -= 1;
        if track.bootstraps == 0 {
            track.backlog.clear();
        }
    }
}

/// Client-side projection of the daemon's player state.
pub struct PlayerStateSync {
    shared: Arc<Shared>,
    _subscription: Subscription,
    watcher: JoinHandle<()>,
}

impl std::fmt::Debug for PlayerStateSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerStateSync").field("stale", &self.is_stale()).finish_non_exhaustive()
    }
}

impl Drop for PlayerStateSync {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

impl PlayerStateSync {
    /// Start following a client's `playerStatus` pushes.
    ///
    /// Must be called from within a tokio runtime; the connection status is
    /// watched on a background task so a disconnect marks the state stale.
    #[must_use]
    pub fn attach(client: &IpcClient) -> Self {
        let shared = Arc::new(Shared::new());

        let subscription = client.on(EventType::PlayerStatus, {
            let shared = Arc::clone(&shared);
            move |push| {
                shared.apply_push(push);
            }
        });

        let mut status = client.status();
        let watcher = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                while status.changed().await.is_ok() {
                    if *status.borrow_and_update() == ConnectionStatus::Disconnected {
                        debug!("Connection lost, player state is stale");
                        shared.stale.store(true, Ordering::Release);
                    }
                }
            }
        });

        Self { shared, _subscription: subscription, watcher }
    }

    /// Merge a partial state push. Keys that break the state schema are
    /// dropped and returned.
    pub fn apply_push(&self, push: &Value) -> Vec<MergeError> {
        self.shared.apply_push(push)
    }

    /// Latest merged state. It may lag behind the daemon between pushes.
    #[must_use]
    pub fn read(&self) -> Arc<PlayerState> {
        self.shared.snapshot.load_full()
    }

    /// Whether the connection dropped since the last push or bootstrap.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.shared.stale.load(Ordering::Acquire)
    }

    /// Replace the projection with a full snapshot from the daemon.
    ///
    /// Pushes that arrive while the snapshot is being fetched are replayed
    /// over it, so a push delivered right behind the response is not lost.
    /// Does nothing for unauthenticated sessions. Returns whether a snapshot
    /// was installed.
    ///
    /// # Errors
    /// Returns the invocation error, or a snapshot error if the daemon's
    /// answer does not match the state schema.
    pub async fn bootstrap(&self, client: &IpcClient) -> RemoteResult<bool> {
        if !client.is_authenticated() {
            debug!("Skipping player bootstrap for anonymous session");
            return Ok(false);
        }

        let _bootstrapping = Bootstrapping::start(&self.shared);
        let snapshot = client.invoke_raw(GetPlayerStatus::NAME, None).await?;

        let mut guard = self.shared.track.lock();
        let track = &mut *guard;
        track.projection.reset(&snapshot)?;
        for push in &track.backlog {
            track.projection.apply_push(push);
        }
        self.shared.publish(&track.projection);
        info!(
            status = ?track.projection.state().player_status,
            replayed = track.backlog.len(),
            "Player state bootstrapped"
        );
        Ok(true)
    }
}
