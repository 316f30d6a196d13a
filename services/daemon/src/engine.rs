//! The download-engine collaborator contract.
//!
//! The engine proper (segmented fetching, protocol adapters, file
//! assembly) lives outside this subsystem; the daemon only needs the
//! narrow surface below.  Progress flows back over an event channel the
//! caller supplies to `add`/`resume`; on resume the caller passes a
//! fresh sender, which is how notification handlers get rewired.

use std::path::PathBuf;
use tokio::sync::mpsc;

/// What the caller asks the engine to fetch.
#[derive(Debug, Clone, Default)]
pub struct DownloadSpec {
    pub url: String,
    pub dir: Option<PathBuf>,
    pub file_name: Option<String>,
    /// Requested parallel connections; the engine may clamp or ignore.
    pub connections: Option<u8>,
    /// Extra request headers (already assembled; cookie values included
    /// here are never logged).
    pub headers: Vec<(String, String)>,
    /// Cookie-store path retained on the item for re-import on resume.
    pub cookie_file: Option<PathBuf>,
}

/// One enumerable download.
#[derive(Debug, Clone)]
pub struct DownloadItem {
    pub gid: String,
    pub url: String,
    pub file_name: String,
    pub dir: PathBuf,
    pub total_length: u64,
    pub completed_length: u64,
    /// True while an allocator is live for this download.
    pub active: bool,
    pub cookie_file: Option<PathBuf>,
}

/// Progress callbacks, delivered over the channel given to `add`/`resume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Started { file_name: String, total_length: u64 },
    Progress { completed_length: u64 },
    Complete { total_length: u64 },
    Stopped,
    Error { message: String },
}

pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;

/// Options for resuming a paused download.
#[derive(Debug, Clone, Default)]
pub struct ResumeOptions {
    /// Request headers rebuilt for the new attempt (re-imported cookies
    /// land here; values are never logged).
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("missing or invalid url")]
    InvalidUrl,
    #[error("unknown download: {0}")]
    NotFound(String),
    #[error("download not active: {0}")]
    NotActive(String),
    #[error("download {0} is still writing; remove it after it stops")]
    ActiveWrite(String),
    #[error("engine I/O: {0}")]
    Io(String),
}

/// The engine surface the method handlers adapt to.
pub trait Engine: Send + Sync + 'static {
    /// Schedule a download; returns its gid.  Events for the transfer
    /// flow into `events`.
    fn add(&self, spec: DownloadSpec, events: EventSender) -> Result<String, EngineError>;

    /// Resume a paused download with a fresh event channel.
    fn resume(&self, gid: &str, opts: ResumeOptions, events: EventSender)
    -> Result<(), EngineError>;

    /// Stop a live download, keeping its item for later resume.
    fn pause(&self, gid: &str) -> Result<(), EngineError>;

    fn get(&self, gid: &str) -> Option<DownloadItem>;

    fn list(&self) -> Vec<DownloadItem>;

    /// Remove the item permanently.  Rejected while actively writing.
    fn flush(&self, gid: &str) -> Result<(), EngineError>;
}

/// Wire-level download status, derived from item counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Active,
    Waiting,
    Complete,
}

impl DownloadStatus {
    pub fn of(item: &DownloadItem) -> Self {
        if item.active {
            DownloadStatus::Active
        } else if item.total_length > 0 && item.completed_length >= item.total_length {
            DownloadStatus::Complete
        } else {
            DownloadStatus::Waiting
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Active => "active",
            DownloadStatus::Waiting => "waiting",
            DownloadStatus::Complete => "complete",
        }
    }
}
