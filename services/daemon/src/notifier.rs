//! Registry of connected JSON-RPC observers.
//!
//! Every accepted WebSocket registers its outbound channel here; domain
//! events fan out to all of them as JSON-RPC notifications.  A failed
//! send means the socket task is gone, so the observer is pruned before
//! the next broadcast.

use fd_protocol::jsonrpc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

pub type ObserverSender = mpsc::UnboundedSender<String>;

#[derive(Default)]
pub struct Notifier {
    observers: RwLock<HashMap<u64, ObserverSender>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Notifier::default()
    }

    /// Register an observer; returns the id to unregister with.
    pub async fn register(&self, sender: ObserverSender) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.write().await.insert(id, sender);
        debug!(observer = id, "rpc observer registered");
        id
    }

    /// Remove an observer.  Idempotent: pruning may already have won.
    pub async fn unregister(&self, id: u64) {
        self.observers.write().await.remove(&id);
    }

    /// Push `method`/`params` to every registered observer, pruning the
    /// ones whose channel is gone.
    pub async fn broadcast(&self, method: &str, params: serde_json::Value) {
        let text = jsonrpc::notification(method, params).to_string();

        let snapshot: Vec<(u64, ObserverSender)> = {
            let observers = self.observers.read().await;
            observers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut failed: Vec<u64> = Vec::new();
        for (id, sender) in &snapshot {
            if sender.send(text.clone()).is_err() {
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            debug!(pruned = failed.len(), "pruning dead rpc observers");
            let mut observers = self.observers.write().await;
            for id in failed {
                observers.remove(&id);
            }
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }
}
