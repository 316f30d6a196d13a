//! WebSocket bridge tests: authenticated upgrade, request/response over
//! the socket, and push notifications with the frozen schema.

use fd_test_utils::FakeEngine;
use fetchd::config::DaemonConfig;
use fetchd::engine::DownloadEvent;
use fetchd::runner::Daemon;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;

const SECRET: &str = "test-secret";

fn test_config() -> DaemonConfig {
    DaemonConfig {
        force_tcp: true,
        tcp_port: 0,
        rpc_bind: "127.0.0.1:0".to_owned(),
        rpc_secret: SECRET.to_owned(),
        ..DaemonConfig::default()
    }
}

async fn start_daemon() -> (Daemon, fetchd::state::AppState<FakeEngine>) {
    let engine = Arc::new(FakeEngine::new());
    Daemon::start(test_config(), engine).await.expect("start")
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn ws_connect(daemon: &Daemon, token: &str) -> Result<WsStream, String> {
    let mut request = format!("ws://{}/jsonrpc/ws", daemon.rpc_addr())
        .into_client_request()
        .map_err(|e| e.to_string())?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}").parse().map_err(|_| "header")?,
    );
    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| e.to_string())?;
    Ok(stream)
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("ws message within deadline")
            .expect("socket open")
            .expect("frame ok")
        {
            Message::Text(text) => return serde_json::from_str(&text).expect("json"),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected ws frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn wrong_bearer_is_refused_at_upgrade() {
    let (daemon, _state) = start_daemon().await;

    let err = ws_connect(&daemon, "wrong-secret")
        .await
        .err()
        .expect("handshake must fail");
    assert!(err.contains("401"), "expected HTTP 401, got: {err}");

    daemon
        .shutdown(Some(Duration::from_secs(2)))
        .await
        .expect("shutdown");
}

#[tokio::test]
async fn rpc_calls_work_over_the_socket() {
    let (daemon, _state) = start_daemon().await;
    let mut ws = ws_connect(&daemon, SECRET).await.expect("connect");

    let request = json!({"jsonrpc": "2.0", "method": "system.getVersion", "id": 7});
    ws.send(Message::Text(request.to_string().into()))
        .await
        .expect("send");
    let body = recv_json(&mut ws).await;
    assert_eq!(body["id"], json!(7));
    assert_eq!(body["result"]["version"], json!(fetchd::version::VERSION));

    daemon
        .shutdown(Some(Duration::from_secs(2)))
        .await
        .expect("shutdown");
}

#[tokio::test]
async fn started_notification_matches_the_frozen_shape() {
    let (daemon, state) = start_daemon().await;
    let mut ws = ws_connect(&daemon, SECRET).await.expect("connect");

    // Add a download over the socket so the publisher is wired up.
    let request = json!({
        "jsonrpc": "2.0",
        "method": "download.add",
        "params": {"url": "http://example.com/f.bin"},
        "id": 1,
    });
    ws.send(Message::Text(request.to_string().into()))
        .await
        .expect("send add");
    let body = recv_json(&mut ws).await;
    let gid = body["result"]["gid"].as_str().expect("gid").to_owned();

    state.engine.emit(
        &gid,
        DownloadEvent::Started {
            file_name: "f.bin".to_owned(),
            total_length: 2048,
        },
    );

    let notification = recv_json(&mut ws).await;
    assert_eq!(
        notification,
        json!({
            "jsonrpc": "2.0",
            "method": "download.started",
            "params": {"gid": gid, "fileName": "f.bin", "totalLength": 2048},
        })
    );
    assert!(notification.get("id").is_none(), "notifications carry no id");

    daemon
        .shutdown(Some(Duration::from_secs(2)))
        .await
        .expect("shutdown");
}

#[tokio::test]
async fn disconnected_observer_is_pruned_on_the_next_broadcast() {
    let (daemon, state) = start_daemon().await;

    let ws = ws_connect(&daemon, SECRET).await.expect("connect");
    // Wait for registration to land before dropping the socket.
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.notifier.observer_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("observer registered");
    drop(ws);

    // Unregistration runs when the socket task notices the close; give
    // it the same bounded wait, then make sure a broadcast cannot hang
    // on the departed peer.
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.notifier.observer_count().await > 0 {
            state
                .notifier
                .broadcast("download.progress", json!({"gid": "g"}))
                .await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("observer pruned");

    daemon
        .shutdown(Some(Duration::from_secs(2)))
        .await
        .expect("shutdown");
}
