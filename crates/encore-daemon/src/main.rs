//! Encore Daemon - Karaoke player service.
//!
//! Owns the authoritative player state, settings and playlists, and serves
//! them to remote control surfaces over the IPC command bus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use encore_ipc::{
    AuthorizationGate, CommandRegistry, Event, IncomingRequest, IpcError, IpcServer, Response, socket_path,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod playlists;
mod server;
mod sessions;
mod signals;
mod state;

use server::Outcome;
use sessions::Sessions;
use state::DaemonState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| {
                    let level = &config.daemon.log_level;
                    EnvFilter::try_new(format!("encore_core={level},encore_ipc={level},encore_daemon={level}"))
                })
                .context("Invalid log level")?,
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Encore daemon");

    let gate = AuthorizationGate::new(
        CommandRegistry::standard().context("Failed to build command registry")?,
    );
    info!(commands = gate.registry().len(), "Command registry loaded");

    let sessions = Sessions::new(&config.auth.tokens);
    let mut state = DaemonState::new(config.settings.clone(), config.server.mode());
    info!(mode = ?state.mode(), tokens = config.auth.tokens.len(), "Configuration loaded");

    // Start IPC server
    let socket = config.daemon.socket_path.clone().unwrap_or_else(socket_path);
    info!(?socket, "Starting IPC server");
    let (ipc_server, mut request_rx) =
        IpcServer::bind(&socket).await.context("Failed to start IPC server")?;
    let ipc_server = Arc::new(ipc_server);
    let event_tx = ipc_server.event_sender();

    let ipc_handle = tokio::spawn({
        let ipc_server = Arc::clone(&ipc_server);
        async move { ipc_server.run().await }
    });

    let shutdown = signals::shutdown();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(Duration::from_millis(config.daemon.tick_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();

    info!("Daemon running. Press Ctrl+C to exit.");

    loop {
        tokio::select! {
            Some(incoming) = request_rx.recv() => {
                handle(&gate, &sessions, &mut state, &event_tx, &incoming);
            }

            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now.duration_since(last_tick).as_secs_f64();
                last_tick = now;
                publish(&event_tx, state.tick(elapsed));
            }

            result = &mut shutdown => {
                match result {
                    Ok(signal) => info!(signal, "Shutdown signal received"),
                    Err(e) => warn!(error = %e, "Signal handling failed, shutting down"),
                }
                break;
            }
        }
    }

    info!("Shutting down...");
    ipc_handle.abort();
    if let Err(e) = tokio::fs::remove_file(&socket).await {
        debug!(error = %e, "Socket file already gone");
    }
    info!("Daemon stopped");

    Ok(())
}

/// Answer one request. Pushes caused by a mutation are broadcast only after
/// the response has been handed to the client. Never waits on the client.
fn handle(
    gate: &AuthorizationGate,
    sessions: &Sessions,
    state: &mut DaemonState,
    event_tx: &broadcast::Sender<Event>,
    incoming: &IncomingRequest,
) {
    let request = &incoming.request;
    let session = sessions.resolve(request.authorization.as_deref());
    debug!(client_id = incoming.client_id, request_id = request.id, command = %request.name, "Handling IPC request");

    let (result, events) = match server::handle_request(gate, request, &session, state) {
        Outcome::Reply(result) => (result, Vec::new()),
        Outcome::Apply(command) => match state.apply(command) {
            Ok(applied) => (Ok(applied.data), applied.events),
            Err(error) => (Err(error), Vec::new()),
        },
    };

    if let Err(error) = &result {
        debug!(command = %request.name, code = error.code, message = %error.message, "Request failed");
    }
    match incoming.respond(Response::from_result(request.id, result)) {
        Ok(()) => {}
        Err(IpcError::ClientLagging) => {
            warn!(client_id = incoming.client_id, "Dropped client that stopped reading responses");
        }
        Err(e) => debug!(client_id = incoming.client_id, error = %e, "Client left before the response"),
    }
    publish(event_tx, events);
}

fn publish(event_tx: &broadcast::Sender<Event>, events: Vec<Event>) {
    for event in events {
        // No receivers just means no client is connected
        let _ = event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_core::{ServerMode, Settings};
    use encore_ipc::IpcClient;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn test_request_loop_survives_client_that_never_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let (server, mut request_rx) = IpcServer::bind(&path).await.unwrap();
        let server = Arc::new(server);
        let event_tx = server.event_sender();
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        tokio::spawn(async move {
            let gate = AuthorizationGate::new(CommandRegistry::standard().unwrap());
            let sessions = Sessions::new(&[]);
            let mut state = DaemonState::new(Settings::default(), ServerMode::Normal);
            while let Some(incoming) = request_rx.recv().await {
                handle(&gate, &sessions, &mut state, &event_tx, &incoming);
            }
        });

        let mut flood = UnixStream::connect(&path).await.unwrap();
        tokio::spawn(async move {
            let lines = "{\"id\":1,\"name\":\"getPlayerStatus\"}\n".repeat(50_000);
            let _ = flood.write_all(lines.as_bytes()).await;
            std::future::pending::<()>().await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let client = IpcClient::connect(&path).await.unwrap();
        let settings = tokio::time::timeout(Duration::from_secs(3), client.invoke_raw("getSettings", None))
            .await
            .expect("request loop stalled");
        assert_eq!(settings.unwrap()["playlist"]["maxSongsPerUser"], 5);
    }
}
