// fd-cookies: browser cookie-store import.
//
// Self-contained read path: given the path of a cookie store (or browser
// auto-detection), produce the cookies matching a target domain plus a
// description of where they came from.  The rest of the daemon only sees
// the `import` / `auto_detect` boundary.
//
// Cookie VALUES are secret: they never appear in logs, errors, or
// persisted state.  Only the source path survives, for re-import.

pub mod browsers;
pub mod chrome;
pub mod detect;
pub mod domain;
pub mod firefox;
pub mod netscape;
pub mod profiles;
pub mod snapshot;
mod types;

pub use browsers::auto_detect;
pub use types::{Cookie, CookieError, CookieSource, StoreFormat};

use std::path::Path;

/// Import the cookies matching `domain` from the store at `path`.
///
/// The store format is detected from content, SQLite stores are
/// snapshotted before reading (a live browser may hold the original),
/// and expired entries are dropped.  Returns the matching cookies plus a
/// [`CookieSource`] describing the origin.
pub fn import(path: &Path, domain: &str) -> Result<(Vec<Cookie>, CookieSource), CookieError> {
    let format = detect::detect_format(path)?;
    let cookies = match format {
        StoreFormat::Firefox => {
            let snap = snapshot::Snapshot::take(path)?;
            firefox::read_cookies(snap.db_path(), domain)?
        }
        StoreFormat::Chrome => {
            let snap = snapshot::Snapshot::take(path)?;
            chrome::read_cookies(snap.db_path(), domain)?
        }
        StoreFormat::Netscape => netscape::read_cookies(path, domain)?,
        StoreFormat::Unknown => return Err(CookieError::UnknownFormat(path.to_path_buf())),
    };
    let source = CookieSource {
        path: path.to_path_buf(),
        format,
        browser: browsers::label_for_path(path),
    };
    Ok((cookies, source))
}
