//! Daemon lifecycle.
//!
//! `Daemon::start` binds the IPC listener and the bridge, then runs one
//! accept loop per surface with a task per accepted connection.
//! Shutdown is signal-driven: flipping the watch channel closes both
//! listeners; framed connection tasks drain as their peers disconnect.
//! An optional timeout bounds that drain; exceeding it force-cancels
//! everything and surfaces [`DaemonError::ShutdownTimeout`].

use crate::bridge;
use crate::config::DaemonConfig;
use crate::conn::SyncConn;
use crate::engine::Engine;
use crate::framed;
use crate::listener::{Endpoint, IpcListener, ListenerError};
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("binding rpc bridge: {0}")]
    RpcBind(std::io::Error),
    #[error("shutdown timed out; connections force-cancelled")]
    ShutdownTimeout,
}

/// A running daemon.  Dropping it without `shutdown` leaves the tasks
/// running for the life of the runtime.
pub struct Daemon {
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    ipc_task: JoinHandle<()>,
    rpc_task: JoinHandle<()>,
    ipc_endpoint: Endpoint,
    rpc_addr: SocketAddr,
}

impl Daemon {
    /// Bind both surfaces and start serving.  Returns the daemon handle
    /// plus the shared state (tests drive the engine through it).
    pub async fn start<E: Engine>(
        config: DaemonConfig,
        engine: Arc<E>,
    ) -> Result<(Self, AppState<E>), DaemonError> {
        let state = AppState::new(engine, config.rpc_secret.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut ipc_listener = IpcListener::bind(&config).await?;
        let ipc_endpoint = ipc_listener.local_endpoint();

        let rpc_listener = tokio::net::TcpListener::bind(&config.rpc_bind)
            .await
            .map_err(DaemonError::RpcBind)?;
        let rpc_addr = rpc_listener.local_addr().map_err(DaemonError::RpcBind)?;

        let ipc_task = {
            let state = state.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut conns = JoinSet::new();
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        accepted = ipc_listener.accept() => match accepted {
                            Ok(stream) => {
                                let conn = Arc::new(SyncConn::new(stream));
                                conns.spawn(framed::serve_conn(state.clone(), conn));
                            }
                            Err(e) => {
                                warn!(error = %e, "accept failed; stopping ipc loop");
                                break;
                            }
                        }
                    }
                }
                drop(ipc_listener);
                // Drain connection tasks; they end at peer end-of-stream.
                while conns.join_next().await.is_some() {}
            })
        };

        let rpc_task = {
            let app = bridge::router(state.clone());
            let mut shutdown_rx = shutdown_rx;
            tokio::spawn(async move {
                let shutdown = async move {
                    let _ = shutdown_rx.changed().await;
                };
                if let Err(e) = axum::serve(rpc_listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    warn!(error = %e, "rpc bridge exited with error");
                }
            })
        };

        info!(ipc = %ipc_endpoint, rpc = %rpc_addr, "daemon listening");
        Ok((
            Daemon {
                running: Arc::new(AtomicBool::new(true)),
                shutdown_tx,
                ipc_task,
                rpc_task,
                ipc_endpoint,
                rpc_addr,
            },
            state,
        ))
    }

    /// True between a successful `start` and the end of `shutdown`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn ipc_endpoint(&self) -> &Endpoint {
        &self.ipc_endpoint
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    /// Stop accepting, close the listeners, and wait for connection
    /// tasks to drain.  With a timeout, stragglers are force-cancelled
    /// and `ShutdownTimeout` is returned.
    pub async fn shutdown(self, timeout: Option<Duration>) -> Result<(), DaemonError> {
        let _ = self.shutdown_tx.send(true);
        let ipc_abort = self.ipc_task.abort_handle();
        let rpc_abort = self.rpc_task.abort_handle();
        let drained = async {
            let _ = self.ipc_task.await;
            let _ = self.rpc_task.await;
        };

        let result = match timeout {
            None => {
                drained.await;
                Ok(())
            }
            Some(limit) => match tokio::time::timeout(limit, drained).await {
                Ok(()) => Ok(()),
                Err(_) => {
                    ipc_abort.abort();
                    rpc_abort.abort();
                    Err(DaemonError::ShutdownTimeout)
                }
            },
        };
        self.running.store(false, Ordering::SeqCst);
        info!("daemon stopped");
        result
    }
}
