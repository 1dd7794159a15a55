//! IPC client implementation.
//!
//! One client holds one connection to the daemon. Requests are correlated by
//! id, so any number of invocations may be in flight and their responses may
//! arrive in any order. Push events are dispatched by name to the handlers
//! registered with [`IpcClient::on`]; handlers survive reconnects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use crate::commands::Command;
use crate::error::{AuthorizationFailure, IpcError, IpcResult};
use crate::events::{Event, EventType};
use crate::messages::{Incoming, Request};

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// State of the client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Failure that every surface should report, published by the client so
/// that fire-and-forget callers can ignore their own errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Unauthorized { command: String, reason: AuthorizationFailure },
    ChannelClosed { command: String },
}

/// Event handlers, shared between the client and its reader task.
#[derive(Default)]
struct Subscriptions {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventType, Vec<(u64, Handler)>>>,
}

impl Subscriptions {
    fn insert(&self, event: EventType, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().entry(event).or_default().push((id, handler));
        id
    }

    fn remove(&self, event: EventType, id: u64) {
        let mut handlers = self.handlers.write();
        if let Some(list) = handlers.get_mut(&event) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(&event);
            }
        }
    }

    fn dispatch(&self, event: &Event) {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .get(&event.event)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(&event.data);
        }
    }
}

/// A registered event handler. Dropping it unsubscribes the handler.
#[must_use = "dropping a subscription unsubscribes its handler"]
pub struct Subscription {
    event: EventType,
    id: u64,
    registry: Weak<Subscriptions>,
}

impl Subscription {
    #[must_use]
    pub fn event(&self) -> EventType {
        self.event
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("event", &self.event).field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.event, self.id);
        }
    }
}

/// Result slots of in-flight requests on one connection.
struct PendingTable {
    open: bool,
    slots: HashMap<u64, oneshot::Sender<IpcResult<Value>>>,
}

impl PendingTable {
    fn new() -> Self {
        Self { open: true, slots: HashMap::new() }
    }

    /// Register a slot. Fails once the connection is closed.
    fn register(&mut self, id: u64, tx: oneshot::Sender<IpcResult<Value>>) -> bool {
        if self.open {
            self.slots.insert(id, tx);
        }
        self.open
    }

    /// Reject every pending request and refuse new ones.
    fn close(&mut self) -> usize {
        self.open = false;
        let abandoned = self.slots.len();
        for (_, tx) in self.slots.drain() {
            let _ = tx.send(Err(IpcError::ChannelClosed));
        }
        abandoned
    }
}

struct Connection {
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
    pending: Arc<Mutex<PendingTable>>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.pending.lock().close();
    }
}

/// IPC client for connecting to the Encore daemon.
pub struct IpcClient {
    socket_path: PathBuf,
    connection: tokio::sync::Mutex<Option<Connection>>,
    next_id: AtomicU64,
    subscriptions: Arc<Subscriptions>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    notice_tx: broadcast::Sender<Notice>,
    authorization: RwLock<Option<String>>,
}

impl std::fmt::Debug for IpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcClient").field("socket_path", &self.socket_path).finish_non_exhaustive()
    }
}

impl IpcClient {
    /// Connect to the daemon at the given socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(socket_path: &Path) -> IpcResult<Self> {
        let subscriptions = Arc::new(Subscriptions::default());
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let status_tx = Arc::new(status_tx);
        let (notice_tx, _) = broadcast::channel(64);

        let connection =
            Self::open(socket_path, Arc::clone(&subscriptions), Arc::clone(&status_tx)).await?;
        status_tx.send_replace(ConnectionStatus::Connected);

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            connection: tokio::sync::Mutex::new(Some(connection)),
            next_id: AtomicU64::new(1),
            subscriptions,
            status_tx,
            notice_tx,
            authorization: RwLock::new(None),
        })
    }

    /// Connect to the daemon at the default socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect_default() -> IpcResult<Self> {
        Self::connect(&crate::socket_path()).await
    }

    async fn open(
        socket_path: &Path,
        subscriptions: Arc<Subscriptions>,
        status_tx: Arc<watch::Sender<ConnectionStatus>>,
    ) -> IpcResult<Connection> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();
        let pending = Arc::new(Mutex::new(PendingTable::new()));

        let reader = tokio::spawn(read_loop(
            FramedRead::new(reader, LinesCodec::new()),
            Arc::clone(&pending),
            subscriptions,
            status_tx,
        ));

        Ok(Connection { writer: FramedWrite::new(writer, LinesCodec::new()), pending, reader })
    }

    /// Replace the connection with a fresh one to the same socket.
    ///
    /// Requests still pending on the old connection fail with
    /// [`IpcError::ChannelClosed`]. Event subscriptions are kept.
    ///
    /// # Errors
    /// Returns an error if the new connection fails.
    pub async fn reconnect(&self) -> IpcResult<()> {
        let connection = Self::open(
            &self.socket_path,
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.status_tx),
        )
        .await?;
        *self.connection.lock().await = Some(connection);
        self.status_tx.send_replace(ConnectionStatus::Connected);
        debug!(socket_path = ?self.socket_path, "Reconnected to daemon");
        Ok(())
    }

    /// Close the connection, failing every pending request.
    pub async fn close(&self) {
        self.connection.lock().await.take();
        self.status_tx.send_replace(ConnectionStatus::Disconnected);
    }

    /// Set the session token attached to every request.
    pub fn set_authorization(&self, token: Option<String>) {
        *self.authorization.write() = token;
    }

    /// Whether a session token is set.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authorization.read().is_some()
    }

    /// Watch the connection status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Receive authorization and connectivity failures of any invocation.
    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Register a handler for a push event.
    pub fn on<F>(&self, event: EventType, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.subscriptions.insert(event, Arc::new(handler));
        Subscription { event, id, registry: Arc::downgrade(&self.subscriptions) }
    }

    /// Unregister a handler. Equivalent to dropping the subscription.
    pub fn off(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Invoke a typed command.
    ///
    /// # Errors
    /// Returns the server's error, or a transport error if the request could
    /// not be completed.
    pub async fn invoke<C: Command>(&self, body: C::Body) -> IpcResult<C::Response> {
        let body = serde_json::to_value(body)?;
        let body = (!body.is_null()).then_some(body);
        let data = self.invoke_raw(C::NAME, body).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Invoke a command by wire name.
    ///
    /// # Errors
    /// Returns the server's error, or a transport error if the request could
    /// not be completed.
    pub async fn invoke_raw(&self, name: &str, body: Option<Value>) -> IpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request =
            Request { id, name: name.to_string(), body, authorization: self.authorization.read().clone() };
        let line = serde_json::to_string(&request)?;

        let rx = {
            let mut guard = self.connection.lock().await;
            let Some(connection) = guard.as_mut() else {
                return Err(self.report(name, IpcError::ChannelClosed));
            };

            let (tx, rx) = oneshot::channel();
            if !connection.pending.lock().register(id, tx) {
                return Err(self.report(name, IpcError::ChannelClosed));
            }

            if let Err(e) = connection.writer.send(line).await {
                warn!(command = name, error = %e, "Write failed");
                connection.pending.lock().slots.remove(&id);
                return Err(self.report(name, IpcError::ChannelClosed));
            }
            rx
        };

        debug!(command = name, request_id = id, "Request sent");
        let result = rx.await.unwrap_or(Err(IpcError::ChannelClosed));
        result.map_err(|e| self.report(name, e))
    }

    /// Publish global failures before handing the error back.
    fn report(&self, command: &str, error: IpcError) -> IpcError {
        let notice = match &error {
            IpcError::Authorization(reason) => {
                Some(Notice::Unauthorized { command: command.to_string(), reason: *reason })
            }
            IpcError::ChannelClosed => Some(Notice::ChannelClosed { command: command.to_string() }),
            _ => None,
        };
        if let Some(notice) = notice {
            let _ = self.notice_tx.send(notice);
        }
        error
    }
}

async fn read_loop(
    mut frames: FramedRead<OwnedReadHalf, LinesCodec>,
    pending: Arc<Mutex<PendingTable>>,
    subscriptions: Arc<Subscriptions>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
) {
    while let Some(frame) = frames.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Read error");
                break;
            }
        };

        match serde_json::from_str::<Incoming>(&line) {
            Ok(Incoming::Response(response)) => {
                let slot = pending.lock().slots.remove(&response.id);
                match slot {
                    Some(tx) => {
                        let _ = tx.send(response.into_result().map_err(IpcError::from));
                    }
                    None => warn!(request_id = response.id, "Response for unknown request"),
                }
            }
            Ok(Incoming::Event(event)) => subscriptions.dispatch(&event),
            Err(e) => warn!(error = %e, "Unknown message format"),
        }
    }

    debug!("Connection closed");
    let abandoned = pending.lock().close();
    if abandoned > 0 {
        warn!(abandoned, "Pending requests abandoned");
    }
    status_tx.send_replace(ConnectionStatus::Disconnected);
}
