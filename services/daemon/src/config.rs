//! Daemon configuration.
//!
//! The whole configuration surface is environment variables; there is no
//! config file.  Transport rendezvous variables (socket path, pipe name,
//! TCP port) are shared with the client and live in
//! [`fd_protocol::endpoint`]; the daemon adds only its own knobs.
//!
//! | Variable | Effect |
//! |---|---|
//! | `FETCHD_SOCKET_PATH` | Override the local-domain socket path |
//! | `FETCHD_PIPE_NAME` | Override the named-pipe name (bare or full path) |
//! | `FETCHD_FORCE_TCP=1` | Skip local-domain/pipe; use TCP exclusively |
//! | `FETCHD_TCP_PORT` | TCP port (1–65535; invalid falls back to default) |
//! | `FETCHD_RPC_BIND` | HTTP/WS bridge bind address |
//! | `FETCHD_RPC_SECRET` | Bearer secret for the bridge (empty = reject all) |
//! | `FETCHD_DEBUG=1` | Verbose debug logging |

use fd_protocol::endpoint;
use std::path::PathBuf;

pub use fd_protocol::endpoint::{ENV_DEBUG, ENV_FORCE_TCP, ENV_TCP_PORT, env_flag};

pub const ENV_RPC_BIND: &str = "FETCHD_RPC_BIND";
pub const ENV_RPC_SECRET: &str = "FETCHD_RPC_SECRET";

pub const DEFAULT_RPC_BIND: &str = "127.0.0.1:6960";

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub pipe_name: String,
    pub force_tcp: bool,
    pub tcp_port: u16,
    /// Bind TCP to all interfaces instead of loopback.  Off by default;
    /// there is no TLS, so exposing the port is an explicit decision.
    pub bind_all: bool,
    pub rpc_bind: String,
    /// Bearer secret for the JSON-RPC bridge.  Empty rejects everything.
    pub rpc_secret: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            socket_path: endpoint::socket_path(),
            pipe_name: endpoint::pipe_name(),
            force_tcp: false,
            tcp_port: endpoint::DEFAULT_TCP_PORT,
            bind_all: false,
            rpc_bind: DEFAULT_RPC_BIND.to_owned(),
            rpc_secret: String::new(),
        }
    }
}

impl DaemonConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        let mut cfg = DaemonConfig::default();
        cfg.force_tcp = env_flag(ENV_FORCE_TCP);
        cfg.tcp_port = endpoint::tcp_port();
        if let Ok(bind) = std::env::var(ENV_RPC_BIND) {
            if !bind.trim().is_empty() {
                cfg.rpc_bind = bind.trim().to_owned();
            }
        }
        if let Ok(secret) = std::env::var(ENV_RPC_SECRET) {
            cfg.rpc_secret = secret;
        }
        cfg
    }
}
