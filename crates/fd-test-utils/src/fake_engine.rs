//! A scriptable in-memory [`Engine`].
//!
//! Behaves like the real engine at the contract level (scheme checks,
//! active/paused bookkeeping, flush rules) but performs no I/O.  Tests
//! drive progress by sending [`DownloadEvent`]s through the sender that
//! `add`/`resume` captured.

use fetchd::engine::{
    DownloadEvent, DownloadItem, DownloadSpec, Engine, EngineError, EventSender, ResumeOptions,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct FakeEngine {
    items: Mutex<HashMap<String, DownloadItem>>,
    senders: Mutex<HashMap<String, EventSender>>,
    resume_headers: Mutex<HashMap<String, Vec<(String, String)>>>,
    next_gid: AtomicU64,
}

impl FakeEngine {
    pub fn new() -> Self {
        FakeEngine::default()
    }

    /// The event sender captured for `gid` by the last `add`/`resume`.
    pub fn events(&self, gid: &str) -> Option<EventSender> {
        self.senders.lock().expect("senders lock").get(gid).cloned()
    }

    /// Push one event into the daemon's publish path.
    pub fn emit(&self, gid: &str, event: DownloadEvent) {
        if let Some(sender) = self.events(gid) {
            let _ = sender.send(event);
        }
    }

    /// Mutate the stored item (counters, flags) for status scripting.
    pub fn update_item(&self, gid: &str, update: impl FnOnce(&mut DownloadItem)) {
        if let Some(item) = self.items.lock().expect("items lock").get_mut(gid) {
            update(item);
        }
    }

    /// Headers the last `resume` for `gid` carried.
    pub fn resume_headers(&self, gid: &str) -> Option<Vec<(String, String)>> {
        self.resume_headers
            .lock()
            .expect("resume headers lock")
            .get(gid)
            .cloned()
    }
}

impl Engine for FakeEngine {
    fn add(&self, spec: DownloadSpec, events: EventSender) -> Result<String, EngineError> {
        let url = spec.url.trim().to_owned();
        if url.is_empty() {
            return Err(EngineError::InvalidUrl);
        }
        let Some((scheme, _)) = url.split_once("://") else {
            return Err(EngineError::InvalidUrl);
        };
        if scheme != "http" && scheme != "https" {
            return Err(EngineError::UnsupportedScheme(scheme.to_owned()));
        }

        let gid = format!("fake-{}", self.next_gid.fetch_add(1, Ordering::Relaxed));
        let file_name = spec
            .file_name
            .unwrap_or_else(|| "download.bin".to_owned());
        let item = DownloadItem {
            gid: gid.clone(),
            url,
            file_name,
            dir: spec.dir.unwrap_or_else(|| PathBuf::from(".")),
            total_length: 0,
            completed_length: 0,
            active: true,
            cookie_file: spec.cookie_file,
        };
        self.items.lock().expect("items lock").insert(gid.clone(), item);
        self.senders
            .lock()
            .expect("senders lock")
            .insert(gid.clone(), events);
        Ok(gid)
    }

    fn resume(
        &self,
        gid: &str,
        opts: ResumeOptions,
        events: EventSender,
    ) -> Result<(), EngineError> {
        let mut items = self.items.lock().expect("items lock");
        let item = items
            .get_mut(gid)
            .ok_or_else(|| EngineError::NotFound(gid.to_owned()))?;
        item.active = true;
        self.senders
            .lock()
            .expect("senders lock")
            .insert(gid.to_owned(), events);
        self.resume_headers
            .lock()
            .expect("resume headers lock")
            .insert(gid.to_owned(), opts.headers);
        Ok(())
    }

    fn pause(&self, gid: &str) -> Result<(), EngineError> {
        let mut items = self.items.lock().expect("items lock");
        let item = items
            .get_mut(gid)
            .ok_or_else(|| EngineError::NotFound(gid.to_owned()))?;
        if !item.active {
            return Err(EngineError::NotActive(gid.to_owned()));
        }
        item.active = false;
        Ok(())
    }

    fn get(&self, gid: &str) -> Option<DownloadItem> {
        self.items.lock().expect("items lock").get(gid).cloned()
    }

    fn list(&self) -> Vec<DownloadItem> {
        let mut items: Vec<DownloadItem> =
            self.items.lock().expect("items lock").values().cloned().collect();
        items.sort_by(|a, b| a.gid.cmp(&b.gid));
        items
    }

    fn flush(&self, gid: &str) -> Result<(), EngineError> {
        let mut items = self.items.lock().expect("items lock");
        match items.get(gid) {
            None => return Err(EngineError::NotFound(gid.to_owned())),
            Some(item) if item.active => {
                return Err(EngineError::ActiveWrite(gid.to_owned()));
            }
            Some(_) => {}
        }
        items.remove(gid);
        self.senders.lock().expect("senders lock").remove(gid);
        Ok(())
    }
}
