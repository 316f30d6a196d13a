//! Shared daemon state and the per-download event publisher.

use crate::engine::{DownloadEvent, Engine};
use crate::notifier::Notifier;
use crate::pool::{Pool, Severity};
use fd_protocol::framed::FramedUpdate;
use fd_protocol::notify::{
    self, DownloadComplete, DownloadErrored, DownloadProgress, DownloadStarted,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Everything a connection task needs: the engine, the framed pool, the
/// RPC notifier, and the bridge secret.
pub struct AppState<E: Engine> {
    pub engine: Arc<E>,
    pub pool: Arc<Pool>,
    pub notifier: Arc<Notifier>,
    pub rpc_secret: String,
}

impl<E: Engine> Clone for AppState<E> {
    fn clone(&self) -> Self {
        AppState {
            engine: Arc::clone(&self.engine),
            pool: Arc::clone(&self.pool),
            notifier: Arc::clone(&self.notifier),
            rpc_secret: self.rpc_secret.clone(),
        }
    }
}

impl<E: Engine> AppState<E> {
    pub fn new(engine: Arc<E>, rpc_secret: String) -> Self {
        AppState {
            engine,
            pool: Arc::new(Pool::new()),
            notifier: Arc::new(Notifier::new()),
            rpc_secret,
        }
    }
}

/// Drain one download's engine events, publishing each to the framed
/// pool (under the gid) and to every RPC observer.
///
/// An `Error` event latches in the pool, goes out on both surfaces, and
/// then tears the pool entry down; `Stopped` ends the publisher quietly
/// (resume wires a fresh one).
pub fn spawn_publisher<E: Engine>(
    state: AppState<E>,
    gid: String,
    mut events: mpsc::UnboundedReceiver<DownloadEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                DownloadEvent::Started {
                    file_name,
                    total_length,
                } => {
                    let params = DownloadStarted {
                        gid: gid.clone(),
                        file_name,
                        total_length,
                    };
                    publish(&state, &gid, notify::methods::STARTED, &params).await;
                }
                DownloadEvent::Progress { completed_length } => {
                    let params = DownloadProgress {
                        gid: gid.clone(),
                        completed_length,
                    };
                    publish(&state, &gid, notify::methods::PROGRESS, &params).await;
                }
                DownloadEvent::Complete { total_length } => {
                    let params = DownloadComplete {
                        gid: gid.clone(),
                        total_length,
                    };
                    publish(&state, &gid, notify::methods::COMPLETE, &params).await;
                }
                DownloadEvent::Stopped => break,
                DownloadEvent::Error { message } => {
                    error!(gid = %gid, error = %message, "download failed");
                    state
                        .pool
                        .write_error(&gid, Severity::Critical, message.clone())
                        .await;
                    let params = DownloadErrored {
                        gid: gid.clone(),
                        error: message,
                    };
                    publish(&state, &gid, notify::methods::ERROR, &params).await;
                    for subscriber in state.pool.stop(&gid).await {
                        subscriber.close().await;
                    }
                    break;
                }
            }
        }
        debug!(gid = %gid, "publisher finished");
    })
}

async fn publish<E: Engine, P: serde::Serialize>(
    state: &AppState<E>,
    gid: &str,
    method: &str,
    params: &P,
) {
    let Ok(params) = serde_json::to_value(params) else {
        return;
    };
    let update = FramedUpdate {
        kind: method.to_owned(),
        message: params.clone(),
    };
    if let Ok(payload) = serde_json::to_vec(&update) {
        let _ = state.pool.broadcast(gid, &payload).await;
    }
    state.notifier.broadcast(method, params).await;
}
