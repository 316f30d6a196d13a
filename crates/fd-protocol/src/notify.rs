//! Push-notification schema.
//!
//! These payloads travel two ways: as framed-pool broadcasts to attached
//! subscribers, and as JSON-RPC notifications to connected observers.
//! Field names are frozen; both surfaces serialize identically.

use serde::{Deserialize, Serialize};

pub mod methods {
    pub const STARTED: &str = "download.started";
    pub const PROGRESS: &str = "download.progress";
    pub const COMPLETE: &str = "download.complete";
    pub const ERROR: &str = "download.error";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStarted {
    pub gid: String,
    pub file_name: String,
    pub total_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub gid: String,
    pub completed_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadComplete {
    pub gid: String,
    pub total_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadErrored {
    pub gid: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn started_uses_camel_case_field_names() {
        let wire = serde_json::to_value(DownloadStarted {
            gid: "g1".to_owned(),
            file_name: "f.bin".to_owned(),
            total_length: 2048,
        })
        .expect("serializes");
        assert_eq!(
            wire,
            json!({"gid": "g1", "fileName": "f.bin", "totalLength": 2048})
        );
    }

    #[test]
    fn progress_round_trips() {
        let msg = DownloadProgress {
            gid: "g2".to_owned(),
            completed_length: 512,
        };
        let wire = serde_json::to_string(&msg).expect("serializes");
        assert!(wire.contains("completedLength"));
        let back: DownloadProgress = serde_json::from_str(&wire).expect("parses");
        assert_eq!(back, msg);
    }
}
