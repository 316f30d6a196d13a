//! Netscape cookies.txt reader.
//!
//! Seven tab-separated fields per line:
//! `domain  include_subdomains  path  secure  expiry  name  value`.
//! Comment lines start with `#`, except `#HttpOnly_` which prefixes a
//! real entry and sets the http-only flag.  Malformed lines are skipped
//! with a warning rather than failing the whole import.

use crate::domain::domain_matches;
use crate::types::{Cookie, CookieError};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Read the cookies matching `domain` from a cookies.txt file.
pub fn read_cookies(path: &Path, domain: &str) -> Result<Vec<Cookie>, CookieError> {
    let file = std::fs::File::open(path)?;
    let now = chrono::Utc::now().timestamp();
    let mut cookies = Vec::new();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (entry, http_only) = match trimmed.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None if trimmed.starts_with('#') => continue,
            None => (trimmed, false),
        };

        match parse_line(entry, http_only) {
            Some(cookie) => {
                if !domain_matches(&cookie.domain, domain) {
                    continue;
                }
                if cookie.expires != 0 && cookie.expires <= now {
                    continue;
                }
                cookies.push(cookie);
            }
            None => {
                warn!(
                    file = %path.display(),
                    line = lineno + 1,
                    "skipping malformed cookie line"
                );
            }
        }
    }
    Ok(cookies)
}

fn parse_line(entry: &str, http_only: bool) -> Option<Cookie> {
    let fields: Vec<&str> = entry.split('\t').collect();
    if fields.len() != 7 {
        return None;
    }
    let expires: i64 = fields[4].parse().ok()?;
    Some(Cookie {
        domain: fields[0].to_owned(),
        path: fields[2].to_owned(),
        secure: fields[3].eq_ignore_ascii_case("TRUE"),
        expires,
        name: fields[5].to_owned(),
        value: fields[6].to_owned(),
        http_only,
    })
}
