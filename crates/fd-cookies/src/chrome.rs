//! Chromium-family cookie DB reader.
//!
//! Chrome stores expiry as microseconds since 1601-01-01 (the Windows
//! FILETIME epoch).  Values may be OS-encrypted, in which case the
//! plaintext `value` column is empty; such rows are skipped (decryption
//! is out of scope).

use crate::domain::domain_matches;
use crate::types::{Cookie, CookieError};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Seconds between 1601-01-01 and 1970-01-01.
pub const EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Convert Chrome microseconds-since-1601 to Unix seconds.
pub fn chrome_to_unix(chrome_micros: i64) -> i64 {
    chrome_micros / 1_000_000 - EPOCH_OFFSET_SECS
}

/// Convert Unix seconds to Chrome microseconds-since-1601.
pub fn unix_to_chrome(unix_secs: i64) -> i64 {
    (unix_secs + EPOCH_OFFSET_SECS) * 1_000_000
}

/// Read the cookies matching `domain` from a (snapshotted) Chrome DB.
pub fn read_cookies(db: &Path, domain: &str) -> Result<Vec<Cookie>, CookieError> {
    let conn = Connection::open_with_flags(db, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let now = chrono::Utc::now().timestamp();

    let mut stmt = conn.prepare(
        "SELECT host_key, name, value, path, expires_utc, is_secure, is_httponly
         FROM cookies
         WHERE host_key = ?1 OR host_key = '.' || ?1 OR host_key LIKE '%.' || ?1",
    )?;
    let rows = stmt.query_map([domain], |row| {
        Ok(Cookie {
            domain: row.get(0)?,
            name: row.get(1)?,
            value: row.get(2)?,
            path: row.get(3)?,
            expires: row.get::<_, i64>(4)?,
            secure: row.get::<_, i64>(5)? != 0,
            http_only: row.get::<_, i64>(6)? != 0,
        })
    })?;

    let mut cookies = Vec::new();
    for row in rows {
        let mut cookie = row?;
        // Empty plaintext means the value is encrypted; skip it.
        if cookie.value.is_empty() {
            continue;
        }
        debug_assert!(domain_matches(&cookie.domain, domain));
        // expires_utc of 0 marks a session cookie.
        if cookie.expires != 0 {
            let unix = chrome_to_unix(cookie.expires);
            if unix <= now {
                continue;
            }
            cookie.expires = unix;
        }
        cookies.push(cookie);
    }
    Ok(cookies)
}
