//! SyncConn: a framed connection safe for concurrent readers and writers.
//!
//! The read and write halves sit behind independent async mutexes, so
//! the connection's own request loop can block in `read` while the pool
//! broadcasts through `writer`.  The write mutex is exposed precisely so
//! the pool can issue its split header-then-body send atomically with
//! respect to any other writer on the same connection.

use crate::listener::IpcStream;
use fd_protocol::frame::{self, FrameError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub struct SyncConn {
    id: u64,
    reader: Mutex<ReadHalf<IpcStream>>,
    writer: Arc<Mutex<WriteHalf<IpcStream>>>,
    closed: AtomicBool,
}

impl SyncConn {
    pub fn new(stream: IpcStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        SyncConn {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            reader: Mutex::new(reader),
            writer: Arc::new(Mutex::new(writer)),
            closed: AtomicBool::new(false),
        }
    }

    /// Process-unique connection id; the pool uses it for eviction.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read one framed payload.
    pub async fn read(&self) -> Result<Vec<u8>, FrameError> {
        let mut reader = self.reader.lock().await;
        frame::read_frame(&mut *reader).await
    }

    /// Write one framed payload as a single logical send.
    pub async fn write(&self, payload: &[u8]) -> Result<(), FrameError> {
        let encoded = frame::encode_frame(payload)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// The shared write half.  Broadcasters lock it across their split
    /// header+body sequence; nothing here may be held across the pool's
    /// own lock.
    pub fn writer(&self) -> Arc<Mutex<WriteHalf<IpcStream>>> {
        Arc::clone(&self.writer)
    }

    /// Shut down the write side.  Idempotent: the second and later calls
    /// are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
