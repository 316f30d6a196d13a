//! Transport rendezvous shared by daemon and client.
//!
//! Both ends must derive the same socket path, pipe name, and TCP port
//! from the same environment variables, so the defaults live next to the
//! wire format rather than in either binary.

use std::path::PathBuf;

pub const ENV_SOCKET_PATH: &str = "FETCHD_SOCKET_PATH";
pub const ENV_PIPE_NAME: &str = "FETCHD_PIPE_NAME";
pub const ENV_FORCE_TCP: &str = "FETCHD_FORCE_TCP";
pub const ENV_TCP_PORT: &str = "FETCHD_TCP_PORT";
pub const ENV_DEBUG: &str = "FETCHD_DEBUG";
pub const ENV_SUPPRESS_VERSION_CHECK: &str = "FETCHD_SUPPRESS_VERSION_CHECK";

pub const DEFAULT_TCP_PORT: u16 = 3849;
pub const DEFAULT_PIPE_NAME: &str = "fetchd";
pub const PIPE_PREFIX: &str = r"\\.\pipe\";

/// True when the variable is set to `1`.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v.trim() == "1")
}

/// The local-domain socket path: the `FETCHD_SOCKET_PATH` override, or
/// `~/.fetchd/fetchd.sock` (temp dir when no home is available).
pub fn socket_path() -> PathBuf {
    if let Some(path) = std::env::var_os(ENV_SOCKET_PATH) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    base.join(".fetchd").join("fetchd.sock")
}

/// The named-pipe name: the `FETCHD_PIPE_NAME` override (bare or already
/// prefixed), or the default, always returned fully prefixed.
pub fn pipe_name() -> String {
    let name = std::env::var(ENV_PIPE_NAME)
        .ok()
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_PIPE_NAME.to_owned());
    if name.starts_with(PIPE_PREFIX) {
        name
    } else {
        format!("{PIPE_PREFIX}{name}")
    }
}

/// The TCP port: the `FETCHD_TCP_PORT` override when valid (1–65535),
/// the default otherwise.
pub fn tcp_port() -> u16 {
    std::env::var(ENV_TCP_PORT)
        .ok()
        .and_then(|raw| parse_port(&raw))
        .unwrap_or(DEFAULT_TCP_PORT)
}

/// Parse a TCP port, accepting only 1–65535.
pub fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_port_accepts_the_valid_range_only() {
        assert_eq!(parse_port("1"), Some(1));
        assert_eq!(parse_port("65535"), Some(65535));
        assert_eq!(parse_port(" 8080 "), Some(8080));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("65536"), None);
        assert_eq!(parse_port("-1"), None);
        assert_eq!(parse_port("port"), None);
    }

    #[test]
    fn pipe_name_is_always_fully_prefixed() {
        assert!(pipe_name().starts_with(PIPE_PREFIX));
    }
}
