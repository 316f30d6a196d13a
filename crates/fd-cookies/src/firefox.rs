//! Mozilla-family cookie DB reader.
//!
//! Firefox (and LibreWolf) store plaintext values in `moz_cookies` with
//! expiry already in Unix seconds, so no epoch conversion is needed.

use crate::domain::domain_matches;
use crate::types::{Cookie, CookieError};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Read the cookies matching `domain` from a (snapshotted) Firefox DB.
pub fn read_cookies(db: &Path, domain: &str) -> Result<Vec<Cookie>, CookieError> {
    let conn = Connection::open_with_flags(db, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let now = chrono::Utc::now().timestamp();

    let mut stmt = conn.prepare(
        "SELECT host, name, value, path, expiry, isSecure, isHttpOnly
         FROM moz_cookies
         WHERE host = ?1 OR host = '.' || ?1 OR host LIKE '%.' || ?1",
    )?;
    let rows = stmt.query_map([domain], |row| {
        Ok(Cookie {
            domain: row.get(0)?,
            name: row.get(1)?,
            value: row.get(2)?,
            path: row.get(3)?,
            expires: row.get(4)?,
            secure: row.get::<_, i64>(5)? != 0,
            http_only: row.get::<_, i64>(6)? != 0,
        })
    })?;

    let mut cookies = Vec::new();
    for row in rows {
        let cookie = row?;
        debug_assert!(domain_matches(&cookie.domain, domain));
        if cookie.expires != 0 && cookie.expires <= now {
            continue;
        }
        cookies.push(cookie);
    }
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_db(dir: &tempfile::TempDir) -> (std::path::PathBuf, Connection) {
        let path = dir.path().join("cookies.sqlite");
        let conn = Connection::open(&path).expect("create db");
        conn.execute(
            "CREATE TABLE moz_cookies (
                 host TEXT, name TEXT, value TEXT, path TEXT,
                 expiry INTEGER, isSecure INTEGER, isHttpOnly INTEGER
             )",
            [],
        )
        .expect("create table");
        (path, conn)
    }

    #[test]
    fn reads_matching_rows_and_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, conn) = make_db(&dir);
        let future = chrono::Utc::now().timestamp() + 3600;
        conn.execute(
            "INSERT INTO moz_cookies VALUES ('.example.com', 'sid', 'v', '/dl', ?1, 1, 1)",
            [future],
        )
        .expect("insert");
        drop(conn);

        let cookies = read_cookies(&path, "example.com").expect("reads");
        assert_eq!(cookies.len(), 1);
        let c = &cookies[0];
        assert_eq!(c.domain, ".example.com");
        assert_eq!(c.path, "/dl");
        assert!(c.secure);
        assert!(c.http_only);
    }

    #[test]
    fn expired_rows_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, conn) = make_db(&dir);
        conn.execute(
            "INSERT INTO moz_cookies VALUES ('example.com', 'old', 'v', '/', 1000, 0, 0)",
            [],
        )
        .expect("insert");
        drop(conn);

        assert!(read_cookies(&path, "example.com").expect("reads").is_empty());
    }

    #[test]
    fn unrelated_hosts_are_not_returned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, conn) = make_db(&dir);
        conn.execute(
            "INSERT INTO moz_cookies VALUES ('badexample.com', 'x', 'v', '/', 0, 0, 0)",
            [],
        )
        .expect("insert");
        drop(conn);

        assert!(read_cookies(&path, "example.com").expect("reads").is_empty());
    }
}
