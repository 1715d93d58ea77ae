//! Live status fan-out
//!
//! Ingestion runs on blocking worker threads; WebSocket clients live on the tokio runtime.
//! The two sides meet at an unbounded channel: [`StatusPublisher`] is the sending half held
//! by the ingestor, and [`run_dispatch`] drains it on the runtime and hands each event to
//! the [`Broadcaster`].

use a360_common::events::{EventLogRecord, WatcherEvent};
use a360_common::jsonl::JsonlWriter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry of connected clients
///
/// Each client is an unbounded sender feeding that client's socket task. The registry
/// mutex is independent of the ledger lock.
#[derive(Debug, Default)]
pub struct Broadcaster {
    clients: Mutex<HashMap<Uuid, mpsc::UnboundedSender<String>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client; returns its id and the receiver of its outgoing frames
    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let count = {
            let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            clients.insert(id, tx);
            clients.len()
        };
        info!(client_id = %id, clients = count, "Status client connected");
        (id, rx)
    }

    pub fn unregister(&self, id: &Uuid) {
        let removed = self
            .clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some();
        if removed {
            info!(client_id = %id, "Status client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Serialize once and deliver to every client; returns the number delivered
    ///
    /// A client whose channel is closed is dropped from the registry. Failures never
    /// reach the caller.
    pub fn broadcast(&self, event: &WatcherEvent) -> usize {
        let message = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize status event: {}", e);
                return 0;
            }
        };

        // Snapshot so no send happens while the registry is locked
        let clients: Vec<(Uuid, mpsc::UnboundedSender<String>)> = self
            .clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in clients {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(client_id = %id, "Dropping client with closed channel");
                self.unregister(&id);
            }
        }
        delivered
    }
}

/// Sending half of the status hand-off, safe to use from any thread
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: mpsc::UnboundedSender<WatcherEvent>,
    event_log: Option<Arc<JsonlWriter>>,
}

impl StatusPublisher {
    /// Create the publisher and the receiver to pass to [`run_dispatch`]
    pub fn channel(
        event_log: Option<Arc<JsonlWriter>>,
    ) -> (Self, mpsc::UnboundedReceiver<WatcherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, event_log }, rx)
    }

    /// Append to the event log (when enabled) and queue for broadcast
    pub fn publish(&self, event: WatcherEvent) {
        debug!(
            subject_id = %event.subject_id,
            image = %event.image,
            status = %event.status,
            "Status event"
        );

        if let Some(log) = &self.event_log {
            log.append_best_effort(&EventLogRecord::new(&event));
        }

        if self.tx.send(event).is_err() {
            debug!("Status dispatcher stopped; event not broadcast");
        }
    }
}

/// Drain the hand-off channel into the broadcaster until every publisher is dropped
pub async fn run_dispatch(mut rx: mpsc::UnboundedReceiver<WatcherEvent>, broadcaster: Arc<Broadcaster>) {
    debug!("Status dispatcher started");
    while let Some(event) = rx.recv().await {
        broadcaster.broadcast(&event);
    }
    debug!("Status dispatcher stopped");
}
