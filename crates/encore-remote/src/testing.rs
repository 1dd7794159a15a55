//! In-process daemon stand-in for surface tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use encore_ipc::{Event, IpcServer, Request, Response};
use serde_json::Value;
use tokio::sync::mpsc;

pub struct FakeDaemon {
    pub server: Arc<IpcServer>,
    pub path: PathBuf,
    pub requests: mpsc::UnboundedReceiver<Request>,
    _dir: tempfile::TempDir,
}

impl FakeDaemon {
    /// Start a server that records every request and answers it with
    /// `answer(name)`, or `null` when that returns `None`.
    pub async fn start<F>(answer: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let (server, mut incoming) = IpcServer::bind(&path).await.unwrap();
        let server = Arc::new(server);
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        let (record_tx, requests) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(request) = incoming.recv().await {
                let data = answer(&request.request.name).unwrap_or(Value::Null);
                let response = Response::success(request.request.id, data);
                let _ = record_tx.send(request.request.clone());
                let _ = request.respond(response);
            }
        });

        Self { server, path, requests, _dir: dir }
    }

    /// Next recorded request, failing the test after a second.
    pub async fn next_request(&mut self) -> Request {
        tokio::time::timeout(Duration::from_secs(1), self.requests.recv())
            .await
            .expect("no request arrived")
            .expect("daemon stopped")
    }

    /// Broadcast `event` until `done` holds. The server only delivers pushes
    /// to clients it has finished registering.
    pub async fn push_until(&self, event: &Event, mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            self.server.broadcast(event.clone());
            tokio::time::sleep(Duration::from_millis(20)).await;
            if done() {
                return;
            }
        }
        panic!("push was never observed");
    }
}
