//! Framed client connection.
//!
//! One stream carries both call responses and, once attached, pool
//! broadcast updates.  `call` skips updates into a pending queue so a
//! concurrent broadcast never corrupts request/response pairing;
//! `recv_update` drains that queue before reading the stream.

use crate::uri::EndpointUri;
use fd_protocol::frame::{self, FrameError};
use fd_protocol::framed::{FramedRequest, FramedResponse, FramedUpdate};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[cfg(unix)]
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("daemon error: {0}")]
    Daemon(String),
}

/// The dialed stream, unified across transports.
#[derive(Debug)]
pub enum ClientStream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
    #[cfg(windows)]
    Pipe(tokio::net::windows::named_pipe::NamedPipeClient),
}

impl ClientStream {
    /// Dial a parsed endpoint.
    pub async fn connect(endpoint: &EndpointUri) -> std::io::Result<Self> {
        match endpoint {
            #[cfg(unix)]
            EndpointUri::Local(path) => Ok(ClientStream::Unix(UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            EndpointUri::Local(_) => Err(std::io::Error::other("local sockets need POSIX")),
            EndpointUri::Tcp { host, port } => Ok(ClientStream::Tcp(
                TcpStream::connect((host.as_str(), *port)).await?,
            )),
            #[cfg(windows)]
            EndpointUri::Pipe(name) => Ok(ClientStream::Pipe(
                tokio::net::windows::named_pipe::ClientOptions::new().open(name)?,
            )),
            #[cfg(not(windows))]
            EndpointUri::Pipe(_) => Err(std::io::Error::other("named pipes need Windows")),
        }
    }
}

macro_rules! each_stream {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self.get_mut() {
            #[cfg(unix)]
            ClientStream::Unix($inner) => $body,
            ClientStream::Tcp($inner) => $body,
            #[cfg(windows)]
            ClientStream::Pipe($inner) => $body,
        }
    };
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        each_stream!(self, inner => Pin::new(inner).poll_read(cx, buf))
    }
}

impl AsyncWrite for ClientStream {
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

/// One message off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Response(FramedResponse),
    Update(FramedUpdate),
}

/// A connected framed-protocol client.
#[derive(Debug)]
pub struct Client {
    stream: ClientStream,
    endpoint: EndpointUri,
    pending_updates: VecDeque<FramedUpdate>,
}

impl Client {
    pub fn new(stream: ClientStream, endpoint: EndpointUri) -> Self {
        Client {
            stream,
            endpoint,
            pending_updates: VecDeque::new(),
        }
    }

    pub fn endpoint(&self) -> &EndpointUri {
        &self.endpoint
    }

    /// Issue one request and wait for its response.  Updates that arrive
    /// first are queued for `recv_update`.
    pub async fn call(&mut self, method: &str, data: Value) -> Result<FramedResponse, ClientError> {
        let request = FramedRequest {
            method: method.to_owned(),
            data,
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| ClientError::Protocol(e.to_string()))?;
        frame::write_frame(&mut self.stream, &payload).await?;

        loop {
            match self.read_message().await? {
                ClientMessage::Response(response) => return Ok(response),
                ClientMessage::Update(update) => self.pending_updates.push_back(update),
            }
        }
    }

    /// Like [`Client::call`] but turns `{ok:false}` into an error and
    /// unwraps the update message.
    pub async fn call_expect(&mut self, method: &str, data: Value) -> Result<Value, ClientError> {
        let response = self.call(method, data).await?;
        if !response.ok {
            return Err(ClientError::Daemon(
                response.error.unwrap_or_else(|| "unknown error".to_owned()),
            ));
        }
        Ok(response.update.map(|u| u.message).unwrap_or(Value::Null))
    }

    /// Wait for the next broadcast update (after `download.attach`).
    pub async fn recv_update(&mut self) -> Result<FramedUpdate, ClientError> {
        if let Some(update) = self.pending_updates.pop_front() {
            return Ok(update);
        }
        match self.read_message().await? {
            ClientMessage::Update(update) => Ok(update),
            // A response with no call in flight is a peer bug.
            ClientMessage::Response(_) => {
                Err(ClientError::Protocol("unexpected response frame".to_owned()))
            }
        }
    }

    async fn read_message(&mut self) -> Result<ClientMessage, ClientError> {
        let payload = frame::read_frame(&mut self.stream).await?;
        // Responses always carry `ok`; updates never do.
        let value: Value =
            serde_json::from_slice(&payload).map_err(|e| ClientError::Protocol(e.to_string()))?;
        if value.get("ok").is_some() {
            let response: FramedResponse = serde_json::from_value(value)
                .map_err(|e| ClientError::Protocol(e.to_string()))?;
            Ok(ClientMessage::Response(response))
        } else {
            let update: FramedUpdate = serde_json::from_value(value)
                .map_err(|e| ClientError::Protocol(e.to_string()))?;
            Ok(ClientMessage::Update(update))
        }
    }
}
