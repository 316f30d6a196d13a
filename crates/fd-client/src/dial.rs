//! Daemon dialer with autospawn.
//!
//! - An explicit URI is parsed, validated, and dialed directly; the
//!   daemon is assumed to exist, so there is NO autospawn on that path.
//! - Otherwise the preferred transport is probed with a short timeout;
//!   if nothing answers, the daemon binary is spawned detached and the
//!   transports are polled until the spawn budget runs out.
//! - Every failed attempt is recorded; total failure returns them all.
//!
//! After connecting, the client compares daemon and client versions and
//! warns on mismatch unless `FETCHD_SUPPRESS_VERSION_CHECK` is set.

use crate::client::{Client, ClientStream};
use crate::uri::{EndpointUri, UriError, parse_endpoint_uri};
use fd_protocol::endpoint;
use serde_json::json;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error(transparent)]
    Uri(#[from] UriError),
    #[error("dialing {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },
    #[error("spawning daemon: {0}")]
    Spawn(std::io::Error),
    #[error("no daemon reachable; attempts: {}", .0.join("; "))]
    AllFailed(Vec<String>),
}

/// How to reach (or raise) the daemon.
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// Explicit endpoint; set it and autospawn never happens.
    pub uri: Option<String>,
    /// Spawn the daemon when nothing is reachable.
    pub autospawn: bool,
    /// Daemon binary to spawn; defaults to `fetchd` on PATH.
    pub daemon_binary: PathBuf,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub spawn_budget: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        DialOptions {
            uri: None,
            autospawn: true,
            daemon_binary: PathBuf::from("fetchd"),
            probe_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            spawn_budget: Duration::from_secs(3),
        }
    }
}

/// Connect to the daemon per the options.
pub async fn connect(options: DialOptions) -> Result<Client, DialError> {
    let client = match options.uri.as_deref() {
        Some(raw) => {
            let endpoint = parse_endpoint_uri(raw)?;
            let stream =
                ClientStream::connect(&endpoint)
                    .await
                    .map_err(|source| DialError::Connect {
                        endpoint: endpoint.to_string(),
                        source,
                    })?;
            Client::new(stream, endpoint)
        }
        None => connect_preferred(&options).await?,
    };
    Ok(check_version(client).await)
}

/// The platform preference order for undirected connects.
fn preferred_endpoints() -> Vec<EndpointUri> {
    let mut endpoints = Vec::new();
    if !endpoint::env_flag(endpoint::ENV_FORCE_TCP) {
        #[cfg(unix)]
        endpoints.push(EndpointUri::Local(endpoint::socket_path()));
        #[cfg(windows)]
        endpoints.push(EndpointUri::Pipe(endpoint::pipe_name()));
    }
    endpoints.push(EndpointUri::Tcp {
        host: "127.0.0.1".to_owned(),
        port: endpoint::tcp_port(),
    });
    endpoints
}

async fn connect_preferred(options: &DialOptions) -> Result<Client, DialError> {
    let endpoints = preferred_endpoints();
    let mut attempts: Vec<String> = Vec::new();

    if let Some(client) = probe_all(&endpoints, options.probe_timeout, &mut attempts).await {
        return Ok(client);
    }
    if !options.autospawn {
        return Err(DialError::AllFailed(attempts));
    }

    spawn_daemon(&options.daemon_binary).map_err(DialError::Spawn)?;
    info!(binary = %options.daemon_binary.display(), "daemon spawned; polling");

    let deadline = tokio::time::Instant::now() + options.spawn_budget;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(options.poll_interval).await;
        if let Some(client) = probe_all(&endpoints, options.probe_timeout, &mut attempts).await {
            return Ok(client);
        }
    }
    Err(DialError::AllFailed(attempts))
}

async fn probe_all(
    endpoints: &[EndpointUri],
    timeout: Duration,
    attempts: &mut Vec<String>,
) -> Option<Client> {
    for endpoint in endpoints {
        match probe(endpoint, timeout).await {
            Ok(stream) => {
                debug!(endpoint = %endpoint, "daemon reachable");
                return Some(Client::new(stream, endpoint.clone()));
            }
            Err(e) => attempts.push(format!("{endpoint}: {e}")),
        }
    }
    None
}

async fn probe(endpoint: &EndpointUri, timeout: Duration) -> std::io::Result<ClientStream> {
    match tokio::time::timeout(timeout, ClientStream::connect(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "probe timed out",
        )),
    }
}

/// Spawn the daemon detached from this process.
fn spawn_daemon(binary: &std::path::Path) -> std::io::Result<()> {
    let mut command = Command::new(binary);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group: the daemon must survive the client's exit
        // and never receive the client's terminal signals.
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    command.spawn().map(drop)
}

/// Warn when the daemon's version differs from ours.
async fn check_version(mut client: Client) -> Client {
    if std::env::var_os(endpoint::ENV_SUPPRESS_VERSION_CHECK).is_some() {
        return client;
    }
    match client.call_expect("system.getVersion", json!(null)).await {
        Ok(result) => {
            let daemon_version = result
                .get("version")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            let client_version = env!("CARGO_PKG_VERSION");
            if daemon_version != client_version {
                warn!(
                    daemon = daemon_version,
                    client = client_version,
                    "daemon/client version mismatch"
                );
            }
        }
        Err(e) => debug!(error = %e, "version check skipped"),
    }
    client
}

#[cfg(test)]
mod tests {
    use super::*;
    use fd_protocol::frame;
    use fd_protocol::framed::{FramedRequest, FramedResponse};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// A minimal daemon stand-in answering `system.getVersion`.
    async fn fake_daemon() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    while let Ok(payload) = frame::read_frame(&mut stream).await {
                        let request: FramedRequest =
                            serde_json::from_slice(&payload).expect("request");
                        let response = FramedResponse::ok(
                            request.method,
                            json!({"version": env!("CARGO_PKG_VERSION")}),
                        );
                        let bytes = serde_json::to_vec(&response).expect("encode");
                        let framed = frame::encode_frame(&bytes).expect("frame");
                        if stream.write_all(&framed).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn explicit_uri_connects_without_autospawn() {
        let addr = fake_daemon().await;
        let options = DialOptions {
            uri: Some(format!("tcp://{addr}")),
            // A bogus binary proves autospawn is never consulted.
            daemon_binary: PathBuf::from("/nonexistent/fetchd"),
            ..DialOptions::default()
        };
        let mut client = connect(options).await.expect("connects");
        let result = client
            .call_expect("system.getVersion", json!(null))
            .await
            .expect("version call");
        assert_eq!(result["version"], json!(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn invalid_explicit_uri_fails_at_parse_time() {
        let options = DialOptions {
            uri: Some("ftp://nope".to_owned()),
            ..DialOptions::default()
        };
        assert!(matches!(
            connect(options).await,
            Err(DialError::Uri(UriError::UnknownScheme(_)))
        ));
    }

    #[tokio::test]
    async fn all_transports_failing_names_each_attempt() {
        // No daemon anywhere and autospawn disabled: the composite error
        // lists one attempt per preferred transport.
        let options = DialOptions {
            autospawn: false,
            probe_timeout: Duration::from_millis(50),
            ..DialOptions::default()
        };
        match connect(options).await {
            Err(DialError::AllFailed(attempts)) => {
                assert!(!attempts.is_empty());
                assert!(attempts.iter().any(|a| a.contains("tcp://")));
            }
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_spawn_surfaces_spawn_error() {
        let options = DialOptions {
            daemon_binary: PathBuf::from("/nonexistent/fetchd-binary"),
            probe_timeout: Duration::from_millis(50),
            spawn_budget: Duration::from_millis(200),
            ..DialOptions::default()
        };
        assert!(matches!(connect(options).await, Err(DialError::Spawn(_))));
    }
}
