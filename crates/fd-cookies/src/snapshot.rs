//! Safe SQLite snapshot.
//!
//! A live browser may hold the cookie DB open with an active WAL.
//! Reading the original risks `SQLITE_BUSY` and torn reads, so the DB
//! and its `-wal` / `-shm` companions are copied into a private temp
//! directory first.  Dropping the snapshot removes the directory.

use crate::types::CookieError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A point-in-time copy of a SQLite cookie store.
pub struct Snapshot {
    dir: tempfile::TempDir,
    db_path: PathBuf,
}

impl Snapshot {
    /// Copy `source` (plus any `-wal` / `-shm` companions) into a fresh
    /// temp directory.
    pub fn take(source: &Path) -> Result<Self, CookieError> {
        if !source.exists() {
            return Err(CookieError::NotFound(source.to_path_buf()));
        }
        let dir = tempfile::tempdir()?;
        let file_name = source
            .file_name()
            .map_or_else(|| "cookies.sqlite".into(), ToOwned::to_owned);
        let db_path = dir.path().join(&file_name);
        std::fs::copy(source, &db_path)?;

        for suffix in ["-wal", "-shm"] {
            let companion = companion_path(source, suffix);
            if companion.exists() {
                std::fs::copy(&companion, companion_path(&db_path, suffix))?;
            }
        }

        debug!(source = %source.display(), "snapshotted cookie database");
        Ok(Snapshot { dir, db_path })
    }

    /// Path of the copied database inside the snapshot directory.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The snapshot directory, for tests that inspect companions.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

fn companion_path(db: &Path, suffix: &str) -> PathBuf {
    let mut name = db.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
