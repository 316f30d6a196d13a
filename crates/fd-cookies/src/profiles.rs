//! Mozilla `profiles.ini` resolution.
//!
//! The index lists `[ProfileN]` sections and, since Firefox 67,
//! `[InstallXXXX]` sections whose `Default=` names the profile directory
//! of that install.  An `[Install*]` default wins over a `[Profile*]`
//! section with `Default=1`.  Paths may be relative to the index
//! directory and always use forward slashes in the file.

use crate::types::CookieError;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct ProfileSection {
    path: Option<String>,
    is_relative: bool,
    is_default: bool,
}

/// Resolve the default profile directory from a `profiles.ini`.
pub fn default_profile_dir(ini_path: &Path) -> Result<PathBuf, CookieError> {
    let contents = std::fs::read_to_string(ini_path)
        .map_err(|e| CookieError::ProfileIndex(format!("{}: {e}", ini_path.display())))?;
    let base = ini_path.parent().unwrap_or_else(|| Path::new("."));

    let mut install_default: Option<String> = None;
    let mut profiles: Vec<ProfileSection> = Vec::new();
    let mut current: Option<ProfileSection> = None;
    let mut in_install = false;

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if let Some(section) = current.take() {
                profiles.push(section);
            }
            in_install = name.starts_with("Install");
            current = name.starts_with("Profile").then(ProfileSection::default);
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if in_install {
            if key == "Default" && install_default.is_none() && !value.is_empty() {
                install_default = Some(value.to_owned());
            }
        } else if let Some(section) = current.as_mut() {
            match key {
                "Path" => section.path = Some(value.to_owned()),
                "IsRelative" => section.is_relative = value == "1",
                "Default" => section.is_default = value == "1",
                _ => {}
            }
        }
    }
    if let Some(section) = current.take() {
        profiles.push(section);
    }

    // Install default names a path that is always index-relative unless
    // absolute; it wins over any Profile Default=1.
    if let Some(path) = install_default {
        return Ok(resolve(base, &path, !Path::new(&path).is_absolute()));
    }

    let chosen = profiles
        .iter()
        .find(|p| p.is_default && p.path.is_some())
        .or_else(|| profiles.iter().find(|p| p.path.is_some()))
        .ok_or_else(|| {
            CookieError::ProfileIndex(format!("no usable profile in {}", ini_path.display()))
        })?;
    let path = chosen.path.as_deref().unwrap_or_default();
    Ok(resolve(base, path, chosen.is_relative))
}

fn resolve(base: &Path, raw: &str, relative: bool) -> PathBuf {
    // profiles.ini always writes forward slashes.
    let native = if cfg!(windows) {
        PathBuf::from(raw.replace('/', "\\"))
    } else {
        PathBuf::from(raw)
    };
    if relative { base.join(native) } else { native }
}
