//! Browser store discovery.
//!
//! Each [`BrowserSpec`] names either a Mozilla profile index
//! (`profiles.ini`, resolved to `<profile>/cookies.sqlite`) or direct
//! Chromium cookie DB candidates.  Auto-detection walks the table in
//! priority order and returns the first store that exists on disk.
//!
//! Priority: Firefox > LibreWolf > Chrome > Chromium > Edge > Brave.
//! Within a Chromium install, the newer `Network/Cookies` location
//! outranks the legacy `Cookies`.

use crate::profiles;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    /// Candidates are `profiles.ini` paths.
    Mozilla,
    /// Candidates are cookie DB paths.
    Chromium,
}

/// A known browser and where its cookie store may live.
#[derive(Debug, Clone)]
pub struct BrowserSpec {
    pub name: &'static str,
    pub kind: BrowserKind,
    pub candidates: Vec<PathBuf>,
}

#[cfg(unix)]
fn browser_specs() -> Vec<BrowserSpec> {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    let chromium = |vendor_path: &str| -> Vec<PathBuf> {
        let base = home.join(".config").join(vendor_path).join("Default");
        vec![base.join("Network").join("Cookies"), base.join("Cookies")]
    };
    vec![
        BrowserSpec {
            name: "firefox",
            kind: BrowserKind::Mozilla,
            candidates: vec![home.join(".mozilla/firefox/profiles.ini")],
        },
        BrowserSpec {
            name: "librewolf",
            kind: BrowserKind::Mozilla,
            candidates: vec![home.join(".librewolf/profiles.ini")],
        },
        BrowserSpec {
            name: "chrome",
            kind: BrowserKind::Chromium,
            candidates: chromium("google-chrome"),
        },
        BrowserSpec {
            name: "chromium",
            kind: BrowserKind::Chromium,
            candidates: chromium("chromium"),
        },
        BrowserSpec {
            name: "edge",
            kind: BrowserKind::Chromium,
            candidates: chromium("microsoft-edge"),
        },
        BrowserSpec {
            name: "brave",
            kind: BrowserKind::Chromium,
            candidates: chromium("BraveSoftware/Brave-Browser"),
        },
    ]
}

#[cfg(windows)]
fn browser_specs() -> Vec<BrowserSpec> {
    let appdata = std::env::var_os("APPDATA").map(PathBuf::from).unwrap_or_default();
    let local = std::env::var_os("LOCALAPPDATA")
        .map(PathBuf::from)
        .unwrap_or_default();
    let chromium = |vendor_path: &str| -> Vec<PathBuf> {
        let base = local.join(vendor_path).join("User Data").join("Default");
        vec![base.join("Network").join("Cookies"), base.join("Cookies")]
    };
    vec![
        BrowserSpec {
            name: "firefox",
            kind: BrowserKind::Mozilla,
            candidates: vec![appdata.join("Mozilla\\Firefox\\profiles.ini")],
        },
        BrowserSpec {
            name: "librewolf",
            kind: BrowserKind::Mozilla,
            candidates: vec![appdata.join("librewolf\\profiles.ini")],
        },
        BrowserSpec {
            name: "chrome",
            kind: BrowserKind::Chromium,
            candidates: chromium("Google\\Chrome"),
        },
        BrowserSpec {
            name: "chromium",
            kind: BrowserKind::Chromium,
            candidates: chromium("Chromium"),
        },
        BrowserSpec {
            name: "edge",
            kind: BrowserKind::Chromium,
            candidates: chromium("Microsoft\\Edge"),
        },
        BrowserSpec {
            name: "brave",
            kind: BrowserKind::Chromium,
            candidates: chromium("BraveSoftware\\Brave-Browser"),
        },
    ]
}

/// Find the highest-priority cookie store present on this machine.
///
/// Returns the store path and the browser label, or `None` when no known
/// browser has left a store behind.
pub fn auto_detect() -> Option<(PathBuf, String)> {
    for spec in browser_specs() {
        for candidate in &spec.candidates {
            match spec.kind {
                BrowserKind::Mozilla => {
                    if !candidate.exists() {
                        continue;
                    }
                    if let Ok(profile) = profiles::default_profile_dir(candidate) {
                        let db = profile.join("cookies.sqlite");
                        if db.exists() {
                            debug!(browser = spec.name, "auto-detected cookie store");
                            return Some((db, spec.name.to_owned()));
                        }
                    }
                }
                BrowserKind::Chromium => {
                    if candidate.exists() {
                        debug!(browser = spec.name, "auto-detected cookie store");
                        return Some((candidate.clone(), spec.name.to_owned()));
                    }
                }
            }
        }
    }
    None
}

/// Best-effort browser label for an explicit store path.
pub fn label_for_path(path: &Path) -> String {
    let lowered = path.to_string_lossy().to_lowercase();
    for name in ["librewolf", "firefox", "chromium", "chrome", "edge", "brave"] {
        if lowered.contains(name) {
            return name.to_owned();
        }
    }
    "unknown".to_owned()
}
