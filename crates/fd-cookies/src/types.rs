use std::path::PathBuf;

/// One imported cookie.
///
/// `value` is sensitive: the hand-written `Debug` below redacts it, and
/// nothing in this crate ever logs or persists it.
#[derive(Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// May carry a leading dot, exactly as stored by the browser.
    pub domain: String,
    pub path: String,
    /// Absolute expiry as Unix seconds; 0 means a session cookie.
    pub expires: i64,
    pub secure: bool,
    pub http_only: bool,
}

impl std::fmt::Debug for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expires", &self.expires)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .finish()
    }
}

/// Detected cookie-store format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Firefox,
    Chrome,
    Netscape,
    Unknown,
}

/// Where a batch of cookies came from.  Only `path` is persisted (on the
/// download item, for re-import on resume).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSource {
    pub path: PathBuf,
    pub format: StoreFormat,
    pub browser: String,
}

/// Errors from the import path.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("cookie store not found: {0}")]
    NotFound(PathBuf),
    #[error("unrecognized cookie store format: {0}")]
    UnknownFormat(PathBuf),
    #[error("cookie store read: {0}")]
    Io(#[from] std::io::Error),
    #[error("cookie database: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("profile index unreadable: {0}")]
    ProfileIndex(String),
}
