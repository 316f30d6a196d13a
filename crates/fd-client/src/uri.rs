//! Endpoint-URI parsing.
//!
//! Three schemes name a daemon endpoint:
//! - `local://<absolute path>`: POSIX local-domain socket
//! - `tcp://host[:port]`: TCP, bracketed IPv6 accepted
//! - `pipe://<name>`: Windows named pipe, bare name or full
//!   `\\.\pipe\…` path
//!
//! Input is whitespace-trimmed.  Unknown schemes and schemes the current
//! OS cannot dial are rejected at parse time.

use fd_protocol::endpoint::{DEFAULT_TCP_PORT, PIPE_PREFIX, parse_port};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointUri {
    Local(PathBuf),
    Tcp { host: String, port: u16 },
    Pipe(String),
}

impl std::fmt::Display for EndpointUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointUri::Local(path) => write!(f, "local://{}", path.display()),
            EndpointUri::Tcp { host, port } => {
                if host.contains(':') {
                    write!(f, "tcp://[{host}]:{port}")
                } else {
                    write!(f, "tcp://{host}:{port}")
                }
            }
            EndpointUri::Pipe(name) => write!(f, "pipe://{name}"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UriError {
    #[error("empty endpoint uri")]
    Empty,
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),
    #[error("scheme {0} is not supported on this platform")]
    UnsupportedOnPlatform(&'static str),
    #[error("local endpoint requires an absolute path")]
    RelativePath,
    #[error("invalid tcp endpoint: {0}")]
    InvalidTcp(String),
    #[error("missing pipe name")]
    MissingPipeName,
}

/// Parse and validate an endpoint URI.
pub fn parse_endpoint_uri(raw: &str) -> Result<EndpointUri, UriError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UriError::Empty);
    }
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return Err(UriError::UnknownScheme(
            trimmed.split(':').next().unwrap_or(trimmed).to_owned(),
        ));
    };
    match scheme {
        "local" => parse_local(rest),
        "tcp" => parse_tcp(rest),
        "pipe" => parse_pipe(rest),
        other => Err(UriError::UnknownScheme(other.to_owned())),
    }
}

fn parse_local(rest: &str) -> Result<EndpointUri, UriError> {
    if !cfg!(unix) {
        return Err(UriError::UnsupportedOnPlatform("local"));
    }
    let path = PathBuf::from(rest);
    if !path.is_absolute() {
        return Err(UriError::RelativePath);
    }
    Ok(EndpointUri::Local(path))
}

fn parse_tcp(rest: &str) -> Result<EndpointUri, UriError> {
    if rest.is_empty() {
        return Err(UriError::InvalidTcp("missing host".to_owned()));
    }
    // Bracketed IPv6 literal: [::1] or [::1]:port.
    if let Some(after_bracket) = rest.strip_prefix('[') {
        let Some((host, tail)) = after_bracket.split_once(']') else {
            return Err(UriError::InvalidTcp("unterminated ipv6 literal".to_owned()));
        };
        if host.is_empty() {
            return Err(UriError::InvalidTcp("missing host".to_owned()));
        }
        let port = match tail.strip_prefix(':') {
            None if tail.is_empty() => DEFAULT_TCP_PORT,
            None => {
                return Err(UriError::InvalidTcp(format!(
                    "unexpected trailing characters: {tail}"
                )));
            }
            Some(raw_port) => parse_port(raw_port)
                .ok_or_else(|| UriError::InvalidTcp(format!("invalid port: {raw_port}")))?,
        };
        return Ok(EndpointUri::Tcp {
            host: host.to_owned(),
            port,
        });
    }

    match rest.split_once(':') {
        None => Ok(EndpointUri::Tcp {
            host: rest.to_owned(),
            port: DEFAULT_TCP_PORT,
        }),
        Some((host, _)) if host.is_empty() => {
            Err(UriError::InvalidTcp("missing host".to_owned()))
        }
        Some((host, raw_port)) => {
            // A second colon means an unbracketed IPv6 literal.
            if raw_port.contains(':') {
                return Err(UriError::InvalidTcp(
                    "ipv6 literals must be bracketed".to_owned(),
                ));
            }
            let port = parse_port(raw_port)
                .ok_or_else(|| UriError::InvalidTcp(format!("invalid port: {raw_port}")))?;
            Ok(EndpointUri::Tcp {
                host: host.to_owned(),
                port,
            })
        }
    }
}

fn parse_pipe(rest: &str) -> Result<EndpointUri, UriError> {
    if !cfg!(windows) {
        return Err(UriError::UnsupportedOnPlatform("pipe"));
    }
    if rest.is_empty() {
        return Err(UriError::MissingPipeName);
    }
    let name = if rest.starts_with(PIPE_PREFIX) {
        rest.to_owned()
    } else {
        format!("{PIPE_PREFIX}{rest}")
    };
    Ok(EndpointUri::Pipe(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_unknown_schemes_are_rejected() {
        assert_eq!(parse_endpoint_uri(""), Err(UriError::Empty));
        assert_eq!(parse_endpoint_uri("   "), Err(UriError::Empty));
        assert_eq!(
            parse_endpoint_uri("ftp://host"),
            Err(UriError::UnknownScheme("ftp".to_owned()))
        );
        assert_eq!(
            parse_endpoint_uri("just-a-host"),
            Err(UriError::UnknownScheme("just-a-host".to_owned()))
        );
    }

    #[test]
    fn tcp_defaults_the_port_and_validates_the_range() {
        assert_eq!(
            parse_endpoint_uri("tcp://127.0.0.1"),
            Ok(EndpointUri::Tcp {
                host: "127.0.0.1".to_owned(),
                port: DEFAULT_TCP_PORT,
            })
        );
        assert_eq!(
            parse_endpoint_uri(" tcp://host.example:9000 "),
            Ok(EndpointUri::Tcp {
                host: "host.example".to_owned(),
                port: 9000,
            })
        );
        assert!(matches!(
            parse_endpoint_uri("tcp://host:0"),
            Err(UriError::InvalidTcp(_))
        ));
        assert!(matches!(
            parse_endpoint_uri("tcp://host:70000"),
            Err(UriError::InvalidTcp(_))
        ));
        assert!(matches!(
            parse_endpoint_uri("tcp://:9000"),
            Err(UriError::InvalidTcp(_))
        ));
    }

    #[test]
    fn bracketed_ipv6_literals_parse() {
        assert_eq!(
            parse_endpoint_uri("tcp://[::1]:9000"),
            Ok(EndpointUri::Tcp {
                host: "::1".to_owned(),
                port: 9000,
            })
        );
        assert_eq!(
            parse_endpoint_uri("tcp://[fe80::2]"),
            Ok(EndpointUri::Tcp {
                host: "fe80::2".to_owned(),
                port: DEFAULT_TCP_PORT,
            })
        );
        assert!(matches!(
            parse_endpoint_uri("tcp://[::1"),
            Err(UriError::InvalidTcp(_))
        ));
        assert!(matches!(
            parse_endpoint_uri("tcp://::1:9000"),
            Err(UriError::InvalidTcp(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn local_requires_an_absolute_path_on_unix() {
        assert_eq!(
            parse_endpoint_uri("local:///run/fetchd.sock"),
            Ok(EndpointUri::Local(PathBuf::from("/run/fetchd.sock")))
        );
        assert_eq!(
            parse_endpoint_uri("local://relative/path.sock"),
            Err(UriError::RelativePath)
        );
    }

    #[cfg(unix)]
    #[test]
    fn pipe_is_rejected_on_unix() {
        assert_eq!(
            parse_endpoint_uri("pipe://fetchd"),
            Err(UriError::UnsupportedOnPlatform("pipe"))
        );
    }

    #[cfg(windows)]
    #[test]
    fn pipe_names_gain_the_prefix_once_on_windows() {
        assert_eq!(
            parse_endpoint_uri("pipe://fetchd"),
            Ok(EndpointUri::Pipe(r"\\.\pipe\fetchd".to_owned()))
        );
        assert_eq!(
            parse_endpoint_uri(r"pipe://\\.\pipe\fetchd"),
            Ok(EndpointUri::Pipe(r"\\.\pipe\fetchd".to_owned()))
        );
    }
}
