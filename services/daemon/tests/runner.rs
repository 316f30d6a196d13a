use fetchd::config::DaemonConfig;
use fetchd::listener::Endpoint;
use fetchd::runner::{Daemon, DaemonError};
use std::sync::Arc;
use std::time::Duration;

use fd_protocol::framed::{FramedRequest, FramedResponse};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn test_config() -> DaemonConfig {
    DaemonConfig {
        force_tcp: true,
        tcp_port: 0,
        rpc_bind: "127.0.0.1:0".to_owned(),
        rpc_secret: "test-secret".to_owned(),
        ..DaemonConfig::default()
    }
}

#[tokio::test]
async fn daemon_serves_framed_requests_and_shuts_down() {
    let engine = Arc::new(fd_test_utils::FakeEngine::new());
    let (daemon, _state) = Daemon::start(test_config(), engine).await.expect("starts");
    assert!(daemon.is_running());

    let &Endpoint::Tcp(addr) = daemon.ipc_endpoint() else {
        panic!("expected tcp endpoint under force_tcp");
    };
    let mut client = tokio::net::TcpStream::connect(addr).await.expect("connect");

    let request = serde_json::to_vec(&FramedRequest {
        method: "system.getVersion".to_owned(),
        data: json!(null),
    })
    .expect("encode request");
    let frame = fd_protocol::frame::encode_frame(&request).expect("frame");
    client.write_all(&frame).await.expect("send");

    let mut header = [0u8; 4];
    client.read_exact(&mut header).await.expect("header");
    let len = u32::from_le_bytes(header) as usize;
    let mut body = vec![0u8; len];
    client.read_exact(&mut body).await.expect("body");
    let response: FramedResponse = serde_json::from_slice(&body).expect("parse");
    assert!(response.ok);

    drop(client);
    daemon
        .shutdown(Some(Duration::from_secs(2)))
        .await
        .expect("clean shutdown");
}

#[tokio::test]
async fn shutdown_times_out_when_a_client_lingers() {
    let engine = Arc::new(fd_test_utils::FakeEngine::new());
    let (daemon, _state) = Daemon::start(test_config(), engine).await.expect("starts");
    let &Endpoint::Tcp(addr) = daemon.ipc_endpoint() else {
        panic!("expected tcp endpoint under force_tcp");
    };

    // A connected-but-silent client keeps its task parked in read.
    let lingerer = tokio::net::TcpStream::connect(addr).await.expect("connect");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = daemon.shutdown(Some(Duration::from_millis(200))).await;
    assert!(matches!(result, Err(DaemonError::ShutdownTimeout)));
    drop(lingerer);
}
