//! Per-download fan-out pool.
//!
//! Each in-flight download (keyed by gid) owns an ordered list of framed
//! subscribers plus at most one latched error.  Broadcast never holds
//! the pool lock across I/O: it snapshots the subscriber list under the
//! read lock, sends to each subscriber under that subscriber's own write
//! mutex, and batch-evicts every failed subscriber under a single write
//! lock afterwards.
//!
//! Latched errors are severity-ordered: once a critical error is stored
//! for a gid, warnings no longer overwrite it (`force_write_error`
//! bypasses the latch).

use crate::conn::SyncConn;
use fd_protocol::frame::{self, FrameError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Error severity; `Critical` is terminal for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Warning,
}

/// The latched per-gid error slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadError {
    pub severity: Severity,
    pub message: String,
}

#[derive(Default)]
struct PoolState {
    subscribers: HashMap<String, Vec<Arc<SyncConn>>>,
    errors: HashMap<String, DownloadError>,
}

/// Thread-safe fan-out registry shared by every connection task.
#[derive(Default)]
pub struct Pool {
    state: RwLock<PoolState>,
}

impl Pool {
    pub fn new() -> Self {
        Pool::default()
    }

    /// True when the gid has a live entry.
    pub async fn has(&self, gid: &str) -> bool {
        self.state.read().await.subscribers.contains_key(gid)
    }

    /// Initialize the entry for `gid`, replacing any prior entry.  With
    /// no subscriber the entry starts empty so later connections can
    /// attach.
    pub async fn add(&self, gid: &str, subscriber: Option<Arc<SyncConn>>) {
        let subs = subscriber.map_or_else(Vec::new, |s| vec![s]);
        self.state
            .write()
            .await
            .subscribers
            .insert(gid.to_owned(), subs);
    }

    /// Remove the entry and return its subscribers.  Closing them is the
    /// caller's responsibility (engine-initiated teardown decides how).
    pub async fn stop(&self, gid: &str) -> Vec<Arc<SyncConn>> {
        let mut state = self.state.write().await;
        state.errors.remove(gid);
        state.subscribers.remove(gid).unwrap_or_default()
    }

    /// Append a subscriber.  One critical section: a concurrent attach
    /// can never be lost to a read-then-write race.
    ///
    /// Returns false when the gid has no entry.
    pub async fn attach(&self, gid: &str, subscriber: Arc<SyncConn>) -> bool {
        let mut state = self.state.write().await;
        match state.subscribers.get_mut(gid) {
            Some(subs) => {
                subs.push(subscriber);
                true
            }
            None => false,
        }
    }

    /// Send one framed payload to every subscriber of `gid`.
    ///
    /// Failed subscribers are evicted (and closed) before this returns;
    /// the remaining subscribers keep their relative order.
    pub async fn broadcast(&self, gid: &str, payload: &[u8]) -> Result<(), FrameError> {
        // Snapshot under the read lock, then release it before any I/O.
        let snapshot = {
            let state = self.state.read().await;
            match state.subscribers.get(gid) {
                Some(subs) => subs.clone(),
                None => return Ok(()),
            }
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        let header = frame::frame_header(payload.len())?;
        let mut failed: Vec<u64> = Vec::new();
        for subscriber in &snapshot {
            let writer = subscriber.writer();
            let mut writer = writer.lock().await;
            let sent = async {
                writer.write_all(&header).await?;
                writer.write_all(payload).await?;
                writer.flush().await
            }
            .await;
            drop(writer);
            if sent.is_err() {
                failed.push(subscriber.id());
            }
        }

        if !failed.is_empty() {
            warn!(gid, evicted = failed.len(), "evicting dead subscribers");
            let mut evicted: Vec<Arc<SyncConn>> = Vec::with_capacity(failed.len());
            {
                let mut state = self.state.write().await;
                if let Some(subs) = state.subscribers.get_mut(gid) {
                    subs.retain(|s| {
                        if failed.contains(&s.id()) {
                            evicted.push(Arc::clone(s));
                            false
                        } else {
                            true
                        }
                    });
                }
            }
            // Close outside the pool lock.
            for subscriber in evicted {
                subscriber.close().await;
            }
        }
        Ok(())
    }

    /// Latch an error for `gid`.  A stored critical error is sticky:
    /// non-critical writes are ignored until the entry is removed.
    pub async fn write_error(&self, gid: &str, severity: Severity, message: impl Into<String>) {
        let mut state = self.state.write().await;
        if severity != Severity::Critical {
            if let Some(existing) = state.errors.get(gid) {
                if existing.severity == Severity::Critical {
                    debug!(gid, "keeping latched critical error");
                    return;
                }
            }
        }
        state.errors.insert(
            gid.to_owned(),
            DownloadError {
                severity,
                message: message.into(),
            },
        );
    }

    /// Overwrite the error slot unconditionally.
    pub async fn force_write_error(
        &self,
        gid: &str,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.state.write().await.errors.insert(
            gid.to_owned(),
            DownloadError {
                severity,
                message: message.into(),
            },
        );
    }

    pub async fn get_error(&self, gid: &str) -> Option<DownloadError> {
        self.state.read().await.errors.get(gid).cloned()
    }

    /// Subscriber count for a gid (diagnostics and tests).
    pub async fn subscriber_count(&self, gid: &str) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .get(gid)
            .map_or(0, Vec::len)
    }
}
