//! Basic HTTP engine.
//!
//! A deliberately small [`Engine`] so the daemon binary is runnable:
//! one streaming GET per download, `Range` on resume, abort-on-pause.
//! Segmented fetching and protocol adapters live outside this subsystem.

use crate::engine::{
    DownloadEvent, DownloadItem, DownloadSpec, Engine, EngineError, EventSender, ResumeOptions,
};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use uuid::Uuid;

struct Transfer {
    item: DownloadItem,
    abort: Option<AbortHandle>,
}

type TransferMap = Arc<RwLock<HashMap<String, Transfer>>>;

pub struct HttpEngine {
    client: reqwest::Client,
    transfers: TransferMap,
}

impl HttpEngine {
    /// Must be created inside a tokio runtime; downloads run as tasks.
    pub fn new() -> Self {
        HttpEngine {
            client: reqwest::Client::new(),
            transfers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn spawn_transfer(
        &self,
        gid: String,
        url: String,
        path: PathBuf,
        start: u64,
        headers: Vec<(String, String)>,
        events: EventSender,
    ) -> AbortHandle {
        let client = self.client.clone();
        let transfers = Arc::clone(&self.transfers);
        let handle = tokio::spawn(run_transfer(
            client, transfers, gid, url, path, start, headers, events,
        ));
        handle.abort_handle()
    }
}

impl Default for HttpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for HttpEngine {
    fn add(&self, spec: DownloadSpec, events: EventSender) -> Result<String, EngineError> {
        let url = spec.url.trim().to_owned();
        if url.is_empty() {
            return Err(EngineError::InvalidUrl);
        }
        let Some((scheme, _rest)) = url.split_once("://") else {
            return Err(EngineError::InvalidUrl);
        };
        if scheme != "http" && scheme != "https" {
            return Err(EngineError::UnsupportedScheme(scheme.to_owned()));
        }

        let gid = Uuid::new_v4().simple().to_string();
        let dir = spec
            .dir
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()));
        let file_name = spec
            .file_name
            .unwrap_or_else(|| file_name_from_url(&url));

        // Insert before spawning so the transfer task always finds its
        // item in the map.
        let item = DownloadItem {
            gid: gid.clone(),
            url: url.clone(),
            file_name,
            dir,
            total_length: 0,
            completed_length: 0,
            active: true,
            cookie_file: spec.cookie_file,
        };
        let path = item.dir.join(&item.file_name);
        self.transfers
            .write()
            .expect("transfer map lock")
            .insert(gid.clone(), Transfer { item, abort: None });

        let abort = self.spawn_transfer(gid.clone(), url, path, 0, spec.headers, events);
        if let Some(transfer) = self
            .transfers
            .write()
            .expect("transfer map lock")
            .get_mut(&gid)
        {
            transfer.abort = Some(abort);
        }
        info!(gid = %gid, "download scheduled");
        Ok(gid)
    }

    fn resume(
        &self,
        gid: &str,
        opts: ResumeOptions,
        events: EventSender,
    ) -> Result<(), EngineError> {
        let (url, path, start) = {
            let transfers = self.transfers.read().expect("transfer map lock");
            let transfer = transfers
                .get(gid)
                .ok_or_else(|| EngineError::NotFound(gid.to_owned()))?;
            if transfer.item.active {
                return Ok(());
            }
            (
                transfer.item.url.clone(),
                transfer.item.dir.join(&transfer.item.file_name),
                transfer.item.completed_length,
            )
        };
        let abort = self.spawn_transfer(gid.to_owned(), url, path, start, opts.headers, events);
        let mut transfers = self.transfers.write().expect("transfer map lock");
        if let Some(transfer) = transfers.get_mut(gid) {
            transfer.item.active = true;
            transfer.abort = Some(abort);
        }
        Ok(())
    }

    fn pause(&self, gid: &str) -> Result<(), EngineError> {
        let mut transfers = self.transfers.write().expect("transfer map lock");
        let transfer = transfers
            .get_mut(gid)
            .ok_or_else(|| EngineError::NotFound(gid.to_owned()))?;
        if !transfer.item.active {
            return Err(EngineError::NotActive(gid.to_owned()));
        }
        if let Some(abort) = transfer.abort.take() {
            abort.abort();
        }
        transfer.item.active = false;
        debug!(gid, "download paused");
        Ok(())
    }

    fn get(&self, gid: &str) -> Option<DownloadItem> {
        self.transfers
            .read()
            .expect("transfer map lock")
            .get(gid)
            .map(|t| t.item.clone())
    }

    fn list(&self) -> Vec<DownloadItem> {
        self.transfers
            .read()
            .expect("transfer map lock")
            .values()
            .map(|t| t.item.clone())
            .collect()
    }

    fn flush(&self, gid: &str) -> Result<(), EngineError> {
        let mut transfers = self.transfers.write().expect("transfer map lock");
        match transfers.get(gid) {
            None => return Err(EngineError::NotFound(gid.to_owned())),
            Some(transfer) if transfer.item.active => {
                return Err(EngineError::ActiveWrite(gid.to_owned()));
            }
            Some(_) => {}
        }
        transfers.remove(gid);
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_transfer(
    client: reqwest::Client,
    transfers: TransferMap,
    gid: String,
    url: String,
    path: PathBuf,
    start: u64,
    headers: Vec<(String, String)>,
    events: EventSender,
) {
    let result = fetch(client, &transfers, &gid, &url, &path, start, headers, &events).await;
    let mut map = transfers.write().expect("transfer map lock");
    if let Some(transfer) = map.get_mut(&gid) {
        transfer.item.active = false;
        transfer.abort = None;
        if let Err(message) = result {
            let _ = events.send(DownloadEvent::Error { message });
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn fetch(
    client: reqwest::Client,
    transfers: &TransferMap,
    gid: &str,
    url: &str,
    path: &std::path::Path,
    start: u64,
    headers: Vec<(String, String)>,
    events: &EventSender,
) -> Result<(), String> {
    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    if start > 0 {
        request = request.header("Range", format!("bytes={start}-"));
    }
    let response = request.send().await.map_err(|e| e.to_string())?;
    let response = response.error_for_status().map_err(|e| e.to_string())?;
    let total = start + response.content_length().unwrap_or(0);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_owned());
    let _ = events.send(DownloadEvent::Started {
        file_name,
        total_length: total,
    });
    {
        let mut map = transfers.write().expect("transfer map lock");
        if let Some(transfer) = map.get_mut(gid) {
            transfer.item.total_length = total;
        }
    }

    let mut file = if start > 0 {
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|e| e.to_string())?
    } else {
        tokio::fs::File::create(path).await.map_err(|e| e.to_string())?
    };

    let mut completed = start;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        file.write_all(&chunk).await.map_err(|e| e.to_string())?;
        completed += chunk.len() as u64;
        {
            let mut map = transfers.write().expect("transfer map lock");
            if let Some(transfer) = map.get_mut(gid) {
                transfer.item.completed_length = completed;
            }
        }
        let _ = events.send(DownloadEvent::Progress {
            completed_length: completed,
        });
    }
    file.flush().await.map_err(|e| e.to_string())?;

    // Servers without Content-Length resolve the total at EOF.
    let total = if total > 0 { total } else { completed };
    {
        let mut map = transfers.write().expect("transfer map lock");
        if let Some(transfer) = map.get_mut(gid) {
            transfer.item.total_length = total;
            transfer.item.completed_length = completed;
        }
    }
    let _ = events.send(DownloadEvent::Complete {
        total_length: total,
    });
    Ok(())
}

fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    after_scheme
        .split_once('/')
        .and_then(|(_authority, path)| path.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "download".to_owned())
}
