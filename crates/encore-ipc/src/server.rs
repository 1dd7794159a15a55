//! IPC server implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{IpcError, IpcResult};
use crate::events::Event;
use crate::messages::{Request, Response};

/// Responses a client may have queued before it counts as lagging.
const RESPONSE_BUFFER: usize = 16;

/// A request received from a client, with the route back to it.
#[derive(Debug)]
pub struct IncomingRequest {
    pub client_id: u64,
    pub request: Request,
    response_tx: mpsc::Sender<Response>,
    disconnect: CancellationToken,
}

impl IncomingRequest {
    /// Queue the response for the requesting client. Never waits.
    ///
    /// A client whose response queue is full is not reading its socket; it
    /// is disconnected rather than allowed to hold up the caller.
    ///
    /// # Errors
    /// Returns [`IpcError::ClientLagging`] if the client was disconnected for
    /// lagging, or [`IpcError::ChannelClosed`] if it has gone away.
    pub fn respond(&self, response: Response) -> IpcResult<()> {
        match self.response_tx.try_send(response) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.disconnect.cancel();
                Err(IpcError::ClientLagging)
            }
            Err(TrySendError::Closed(_)) => Err(IpcError::ChannelClosed),
        }
    }
}

/// IPC server that listens for client connections.
pub struct IpcServer {
    listener: UnixListener,
    clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
    next_client_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
    request_tx: mpsc::Sender<IncomingRequest>,
}

struct ClientHandle {
    requests: u64,
}

/// Channels between one client's connection task and the rest of the server.
struct ClientLink {
    id: u64,
    clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
    event_rx: broadcast::Receiver<Event>,
    request_tx: mpsc::Sender<IncomingRequest>,
    response_tx: mpsc::Sender<Response>,
    response_rx: mpsc::Receiver<Response>,
    disconnect: CancellationToken,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be created.
    pub async fn bind(socket_path: &Path) -> IpcResult<(Self, mpsc::Receiver<IncomingRequest>)> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(?socket_path, "IPC server listening");

        let (event_tx, _) = broadcast::channel(256);
        let (request_tx, request_rx) = mpsc::channel(64);

        Ok((
            Self {
                listener,
                clients: Arc::new(RwLock::new(HashMap::new())),
                next_client_id: AtomicU64::new(1),
                event_tx,
                request_tx,
            },
            request_rx,
        ))
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, "Client connected");

                    let (response_tx, response_rx) = mpsc::channel(RESPONSE_BUFFER);
                    let link = ClientLink {
                        id: client_id,
                        clients: Arc::clone(&self.clients),
                        event_rx: self.event_tx.subscribe(),
                        request_tx: self.request_tx.clone(),
                        response_tx,
                        response_rx,
                        disconnect: CancellationToken::new(),
                    };
                    tokio::spawn(Self::handle_client(stream, link));
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get a clone of the event sender for broadcasting from other tasks.
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    /// Number of currently connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn handle_client(stream: UnixStream, mut link: ClientLink) {
        let client_id = link.id;
        let clients = Arc::clone(&link.clients);
        let disconnect = link.disconnect.clone();

        // Register client
        clients.write().await.insert(client_id, ClientHandle { requests: 0 });

        tokio::select! {
            () = disconnect.cancelled() => {
                warn!(client_id, "Client not reading responses, disconnecting");
            }
            () = Self::serve(stream, &mut link) => {}
        }

        // Unregister client
        let handle = clients.write().await.remove(&client_id);
        info!(client_id, requests = handle.map_or(0, |h| h.requests), "Client handler exiting");
    }

    async fn serve(stream: UnixStream, link: &mut ClientLink) {
        let client_id = link.id;
        let (reader, writer) = stream.into_split();
        let mut reader = FramedRead::new(reader, LinesCodec::new());
        let mut writer = FramedWrite::new(writer, LinesCodec::new());

        // A request waiting for room in the daemon's queue. Reading pauses
        // until it is handed over, while responses and events keep flowing.
        let mut queued: Option<Request> = None;

        loop {
            tokio::select! {
                // Read request from client
                frame = reader.next(), if queued.is_none() => {
                    match frame {
                        None => {
                            debug!(client_id, "Client disconnected");
                            break;
                        }
                        Some(Ok(line)) => {
                            if let Ok(request) = serde_json::from_str::<Request>(&line) {
                                debug!(client_id, request_id = request.id, command = %request.name, "Received request");
                                if let Some(handle) = link.clients.write().await.get_mut(&client_id) {
                                    handle.requests += 1;
                                }
                                queued = Some(request);
                            } else {
                                warn!(client_id, "Invalid request format");
                            }
                        }
                        Some(Err(e)) => {
                            error!(client_id, error = %e, "Read error");
                            break;
                        }
                    }
                }

                // Hand the queued request to the daemon
                permit = link.request_tx.reserve(), if queued.is_some() => {
                    let Ok(permit) = permit else {
                        warn!(client_id, "Request handler is gone");
                        break;
                    };
                    if let Some(request) = queued.take() {
                        permit.send(IncomingRequest {
                            client_id,
                            request,
                            response_tx: link.response_tx.clone(),
                            disconnect: link.disconnect.clone(),
                        });
                    }
                }

                // Send response to client
                Some(response) = link.response_rx.recv() => {
                    let json = match serde_json::to_string(&response) {
                        Ok(json) => json,
                        Err(e) => {
                            error!(client_id, error = %e, "Failed to encode response");
                            break;
                        }
                    };
                    if let Err(e) = writer.send(json).await {
                        error!(client_id, error = %e, "Write error");
                        break;
                    }
                }

                // Forward events to client, in broadcast order
                received = link.event_rx.recv() => {
                    match received {
                        Ok(event) => {
                            let json = match serde_json::to_string(&event) {
                                Ok(json) => json,
                                Err(e) => {
                                    error!(client_id, error = %e, "Failed to encode event");
                                    break;
                                }
                            };
                            if let Err(e) = writer.send(json).await {
                                error!(client_id, error = %e, "Event write error");
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(client_id, skipped, "Client lagging, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::IpcClient;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn incoming(response_tx: mpsc::Sender<Response>) -> IncomingRequest {
        IncomingRequest {
            client_id: 1,
            request: Request { id: 1, name: "getPlayerStatus".into(), body: None, authorization: None },
            response_tx,
            disconnect: CancellationToken::new(),
        }
    }

    #[test]
    fn test_respond_never_waits_on_a_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let request = incoming(tx);

        assert!(request.respond(Response::success(1, json!(null))).is_ok());
        assert_matches!(request.respond(Response::success(1, json!(null))), Err(IpcError::ClientLagging));
        assert!(request.disconnect.is_cancelled());
    }

    #[test]
    fn test_respond_to_departed_client() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert_matches!(incoming(tx).respond(Response::success(1, json!(null))), Err(IpcError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_departed_client_is_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let (server, _requests) = IpcServer::bind(&path).await.unwrap();
        let server = Arc::new(server);
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        let stream = UnixStream::connect(&path).await.unwrap();
        wait_for_clients(&server, 1).await;
        drop(stream);
        wait_for_clients(&server, 0).await;
    }

    async fn wait_for_clients(server: &IpcServer, count: usize) {
        for _ in 0..100 {
            if server.client_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server never reached {count} clients");
    }

    #[tokio::test]
    async fn test_client_that_never_reads_does_not_stall_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let (server, mut requests) = IpcServer::bind(&path).await.unwrap();
        let server = Arc::new(server);
        tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        // Answers every request from a single loop, as the daemon does.
        tokio::spawn(async move {
            while let Some(incoming) = requests.recv().await {
                let data = json!({"playerStatus": "stop", "volume": 100.0});
                let _ = incoming.respond(Response::success(incoming.request.id, data));
            }
        });

        let mut flood = UnixStream::connect(&path).await.unwrap();
        tokio::spawn(async move {
            let line = "{\"id\":1,\"name\":\"getPlayerStatus\"}\n".repeat(50_000);
            let _ = flood.write_all(line.as_bytes()).await;
            // Keep the socket open without ever reading from it.
            std::future::pending::<()>().await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let client = IpcClient::connect(&path).await.unwrap();
        let answer = tokio::time::timeout(Duration::from_secs(3), client.invoke_raw("getSettings", None))
            .await
            .expect("healthy client stalled behind a client that never reads");
        assert_eq!(answer.unwrap()["playerStatus"], "stop");
    }
}
