//! Platform-adaptive listener factory.
//!
//! Preference order: local-domain socket (POSIX) → named pipe (Windows)
//! → TCP on loopback.  A bind failure on the preferred transport falls
//! through to TCP; `FETCHD_FORCE_TCP=1` (the `force_tcp` config flag)
//! skips the preferred transport entirely.
//!
//! The rest of the daemon sees only [`IpcListener::accept`] and the
//! unified [`IpcStream`]; transport selection happens here and nowhere
//! else.

use crate::config::DaemonConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Errors from listener acquisition and accept.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The configured socket path exists but is not a socket.  This is
    /// operator error, not a fallback case.
    #[error("refusing to replace non-socket file at {0}")]
    NotASocket(PathBuf),
    #[error("binding {transport} listener: {source}")]
    Bind {
        transport: &'static str,
        source: std::io::Error,
    },
    #[error("accept: {0}")]
    Accept(#[from] std::io::Error),
}

/// Where a listener ended up bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(SocketAddr),
    #[cfg(windows)]
    Pipe(String),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "local:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{addr}"),
            #[cfg(windows)]
            Endpoint::Pipe(name) => write!(f, "pipe:{name}"),
        }
    }
}

/// The accepted-connection stream, unified across transports.
pub enum IpcStream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
    #[cfg(windows)]
    Pipe(tokio::net::windows::named_pipe::NamedPipeServer),
}

macro_rules! each_stream {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self.get_mut() {
            #[cfg(unix)]
            IpcStream::Unix($inner) => $body,
            IpcStream::Tcp($inner) => $body,
            #[cfg(windows)]
            IpcStream::Pipe($inner) => $body,
        }
    };
}

impl AsyncRead for IpcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        each_stream!(self, inner => Pin::new(inner).poll_read(cx, buf))
    }
}

impl AsyncWrite for IpcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        each_stream!(self, inner => Pin::new(inner).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        each_stream!(self, inner => Pin::new(inner).poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        each_stream!(self, inner => Pin::new(inner).poll_shutdown(cx))
    }
}

/// The bound listener.  Accept yields [`IpcStream`]s; dropping the
/// listener closes it (and unlinks the socket path on POSIX).
pub enum IpcListener {
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
    #[cfg(windows)]
    Pipe(windows::PipeListener),
}

impl IpcListener {
    /// Acquire a listener per the platform preference order.
    pub async fn bind(config: &DaemonConfig) -> Result<Self, ListenerError> {
        if !config.force_tcp {
            #[cfg(unix)]
            match bind_unix(&config.socket_path) {
                Ok(listener) => return Ok(listener),
                Err(e @ ListenerError::NotASocket(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "local socket unavailable, falling back to TCP");
                }
            }
            #[cfg(windows)]
            match windows::bind_pipe(&config.pipe_name) {
                Ok(listener) => return Ok(IpcListener::Pipe(listener)),
                Err(e) => {
                    warn!(error = %e, "named pipe unavailable, falling back to TCP");
                }
            }
        }
        bind_tcp(config).await
    }

    /// Accept one connection.
    pub async fn accept(&mut self) -> Result<IpcStream, ListenerError> {
        match self {
            #[cfg(unix)]
            IpcListener::Unix { listener, .. } => {
                let (stream, _addr) = listener.accept().await?;
                Ok(IpcStream::Unix(stream))
            }
            IpcListener::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(IpcStream::Tcp(stream))
            }
            #[cfg(windows)]
            IpcListener::Pipe(listener) => Ok(IpcStream::Pipe(listener.accept().await?)),
        }
    }

    /// The bound endpoint, for logging and for clients in tests.
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            #[cfg(unix)]
            IpcListener::Unix { path, .. } => Endpoint::Unix(path.clone()),
            IpcListener::Tcp(listener) => Endpoint::Tcp(
                listener
                    .local_addr()
                    .unwrap_or_else(|_| ([127, 0, 0, 1], 0).into()),
            ),
            #[cfg(windows)]
            IpcListener::Pipe(listener) => Endpoint::Pipe(listener.name().to_owned()),
        }
    }
}

impl Drop for IpcListener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let IpcListener::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(unix)]
fn bind_unix(path: &std::path::Path) -> Result<IpcListener, ListenerError> {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            return Err(ListenerError::NotASocket(path.to_path_buf()));
        }
        // Stale socket from a previous run; safe to replace.
        let _ = std::fs::remove_file(path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ListenerError::Bind {
            transport: "local",
            source,
        })?;
    }
    let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        transport: "local",
        source,
    })?;
    // Owner-only: the socket is the daemon's control surface.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|source| {
        ListenerError::Bind {
            transport: "local",
            source,
        }
    })?;
    info!(path = %path.display(), "listening on local socket");
    Ok(IpcListener::Unix {
        listener,
        path: path.to_path_buf(),
    })
}

async fn bind_tcp(config: &DaemonConfig) -> Result<IpcListener, ListenerError> {
    let host = if config.bind_all { "0.0.0.0" } else { "127.0.0.1" };
    let listener = TcpListener::bind((host, config.tcp_port))
        .await
        .map_err(|source| ListenerError::Bind {
            transport: "tcp",
            source,
        })?;
    match listener.local_addr() {
        Ok(addr) => info!(addr = %addr, "listening on TCP"),
        Err(_) => info!("listening on TCP"),
    }
    Ok(IpcListener::Tcp(listener))
}

#[cfg(windows)]
pub mod windows {
    //! Named-pipe listener.
    //!
    //! The pipe DACL grants full control to SYSTEM, Administrators, and
    //! the creator-owner only (SDDL below); other local users cannot
    //! open the control surface.  Remote clients are rejected outright.

    use super::ListenerError;
    use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};

    pub const PIPE_PREFIX: &str = r"\\.\pipe\";
    const PIPE_SDDL: &str = "D:P(A;;GA;;;SY)(A;;GA;;;BA)(A;;GA;;;CO)";

    pub struct PipeListener {
        name: String,
        next: Option<NamedPipeServer>,
    }

    pub fn bind_pipe(name: &str) -> Result<PipeListener, ListenerError> {
        let name = if name.starts_with(PIPE_PREFIX) {
            name.to_owned()
        } else {
            format!("{PIPE_PREFIX}{name}")
        };
        let first = create_instance(&name, true)?;
        tracing::info!(pipe = %name, "listening on named pipe");
        Ok(PipeListener {
            name,
            next: Some(first),
        })
    }

    impl PipeListener {
        pub fn name(&self) -> &str {
            &self.name
        }

        /// Wait for a client on the current instance, then stand up the
        /// next instance so a new client can connect immediately.
        pub async fn accept(&mut self) -> Result<NamedPipeServer, std::io::Error> {
            let server = match self.next.take() {
                Some(server) => server,
                None => create_instance(&self.name, false)
                    .map_err(|e| std::io::Error::other(e.to_string()))?,
            };
            server.connect().await?;
            self.next = create_instance(&self.name, false)
                .map_err(|e| std::io::Error::other(e.to_string()))
                .ok();
            Ok(server)
        }
    }

    fn create_instance(name: &str, first: bool) -> Result<NamedPipeServer, ListenerError> {
        let descriptor = SecurityDescriptor::from_sddl(PIPE_SDDL)?;
        let mut attrs = windows_sys::Win32::Security::SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<windows_sys::Win32::Security::SECURITY_ATTRIBUTES>()
                as u32,
            lpSecurityDescriptor: descriptor.ptr,
            bInheritHandle: 0,
        };
        let mut options = ServerOptions::new();
        options.first_pipe_instance(first).reject_remote_clients(true);
        // Safety: `attrs` and the descriptor it points at outlive the call.
        let server = unsafe {
            options.create_with_security_attributes_raw(
                name,
                std::ptr::from_mut(&mut attrs).cast(),
            )
        }
        .map_err(|source| ListenerError::Bind {
            transport: "pipe",
            source,
        })?;
        Ok(server)
    }

    /// Owned self-relative security descriptor parsed from SDDL.
    struct SecurityDescriptor {
        ptr: *mut core::ffi::c_void,
    }

    impl SecurityDescriptor {
        fn from_sddl(sddl: &str) -> Result<Self, ListenerError> {
            use windows_sys::Win32::Security::Authorization::ConvertStringSecurityDescriptorToSecurityDescriptorW;

            let wide: Vec<u16> = sddl.encode_utf16().chain(std::iter::once(0)).collect();
            let mut ptr: *mut core::ffi::c_void = std::ptr::null_mut();
            // Safety: `wide` is a valid NUL-terminated UTF-16 string and
            // `ptr` receives a LocalAlloc'd descriptor we free on drop.
            let ok = unsafe {
                ConvertStringSecurityDescriptorToSecurityDescriptorW(
                    wide.as_ptr(),
                    windows_sys::Win32::Security::Authorization::SDDL_REVISION_1,
                    &mut ptr,
                    std::ptr::null_mut(),
                )
            };
            if ok == 0 {
                return Err(ListenerError::Bind {
                    transport: "pipe",
                    source: std::io::Error::last_os_error(),
                });
            }
            Ok(SecurityDescriptor { ptr })
        }
    }

    impl Drop for SecurityDescriptor {
        fn drop(&mut self) {
            // Safety: `ptr` came from the SDDL conversion's LocalAlloc.
            unsafe {
                windows_sys::Win32::Foundation::LocalFree(self.ptr);
            }
        }
    }
}
