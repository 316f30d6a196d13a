//! Store-format detection.
//!
//! SQLite stores are recognized by the `SQLite format 3\0` magic and then
//! told apart by their table names (`moz_cookies` vs `cookies`).  Text
//! stores are recognized by the Netscape header comment.

use crate::types::{CookieError, StoreFormat};
use rusqlite::{Connection, OpenFlags};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Inspect the file at `path` and classify its format.
pub fn detect_format(path: &Path) -> Result<StoreFormat, CookieError> {
    if !path.exists() {
        return Err(CookieError::NotFound(path.to_path_buf()));
    }

    let mut magic = [0u8; 16];
    let mut file = std::fs::File::open(path)?;
    let n = file.read(&mut magic)?;
    if n == 16 && &magic == SQLITE_MAGIC {
        return classify_sqlite(path);
    }

    // Not SQLite: only the first line decides.
    let mut first_line = String::new();
    BufReader::new(std::fs::File::open(path)?).read_line(&mut first_line)?;
    let header = first_line.trim();
    if header == "# Netscape HTTP Cookie File" || header == "# HTTP Cookie File" {
        return Ok(StoreFormat::Netscape);
    }
    Ok(StoreFormat::Unknown)
}

fn classify_sqlite(path: &Path) -> Result<StoreFormat, CookieError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    if table_exists(&conn, "moz_cookies")? {
        return Ok(StoreFormat::Firefox);
    }
    if table_exists(&conn, "cookies")? {
        return Ok(StoreFormat::Chrome);
    }
    Ok(StoreFormat::Unknown)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
