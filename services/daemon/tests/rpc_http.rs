//! JSON-RPC over HTTP: bearer gate, error-code mapping, and the method
//! handlers end to end against a fake engine.

use fd_test_utils::FakeEngine;
use fetchd::config::DaemonConfig;
use fetchd::engine::Engine;
use fetchd::runner::Daemon;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

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

struct Harness {
    daemon: Daemon,
    state: fetchd::state::AppState<FakeEngine>,
    url: String,
    http: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        let engine = Arc::new(FakeEngine::new());
        let (daemon, state) = Daemon::start(test_config(), engine).await.expect("start");
        let url = format!("http://{}/jsonrpc", daemon.rpc_addr());
        Harness {
            daemon,
            state,
            url,
            http: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Value {
        let body = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
        self.http
            .post(&self.url)
            .bearer_auth(SECRET)
            .json(&body)
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json body")
    }

    async fn stop(self) {
        self.daemon
            .shutdown(Some(Duration::from_secs(2)))
            .await
            .expect("shutdown");
    }
}

#[tokio::test]
async fn missing_authorization_gets_the_exact_401_envelope() {
    let harness = Harness::start().await;

    let response = harness
        .http
        .post(&harness.url)
        .json(&json!({"jsonrpc": "2.0", "method": "system.getVersion", "id": 1}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(
        body,
        json!({
            "jsonrpc": "2.0",
            "error": {"code": -32600, "message": "Unauthorized"},
            "id": null,
        })
    );

    harness.stop().await;
}

#[tokio::test]
async fn wrong_token_and_wrong_scheme_are_rejected() {
    let harness = Harness::start().await;

    for request in [
        harness.http.post(&harness.url).bearer_auth("wrong"),
        harness
            .http
            .post(&harness.url)
            .header("Authorization", format!("Basic {SECRET}")),
    ] {
        let response = request
            .json(&json!({"jsonrpc": "2.0", "method": "system.getVersion", "id": 1}))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), 401);
    }

    harness.stop().await;
}

#[tokio::test]
async fn parse_error_maps_to_32700_with_null_id() {
    let harness = Harness::start().await;

    let response = harness
        .http
        .post(&harness.url)
        .bearer_auth(SECRET)
        .header("content-type", "application/json")
        .body("{not-json")
        .send()
        .await
        .expect("request");
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"]["code"], json!(-32700));
    assert_eq!(body["id"], json!(null));

    harness.stop().await;
}

#[tokio::test]
async fn unsupported_scheme_maps_to_invalid_params_with_exact_message() {
    let harness = Harness::start().await;

    let body = harness
        .call("download.add", json!({"url": "ftp://example.com/x"}))
        .await;
    assert_eq!(body["error"]["code"], json!(-32602));
    assert_eq!(body["error"]["message"], json!("unsupported scheme: ftp"));

    harness.stop().await;
}

#[tokio::test]
async fn method_not_found_and_application_codes_map_exactly() {
    let harness = Harness::start().await;

    let body = harness.call("system.bogus", json!(null)).await;
    assert_eq!(body["error"]["code"], json!(-32601));

    let body = harness.call("download.status", json!({"gid": "missing"})).await;
    assert_eq!(body["error"]["code"], json!(-32001));

    let body = harness.call("download.pause", json!({"gid": "missing"})).await;
    assert_eq!(body["error"]["code"], json!(-32002));

    let body = harness.call("download.add", json!({})).await;
    assert_eq!(body["error"]["code"], json!(-32602));

    harness.stop().await;
}

#[tokio::test]
async fn add_status_list_pause_resume_remove_lifecycle() {
    let harness = Harness::start().await;

    let body = harness
        .call("download.add", json!({"url": "http://example.com/a.bin", "fileName": "a.bin"}))
        .await;
    let gid = body["result"]["gid"].as_str().expect("gid").to_owned();

    // Fresh download: engine reports it active.
    let body = harness.call("download.status", json!({"gid": gid})).await;
    assert_eq!(body["result"]["status"], json!("active"));
    assert_eq!(body["result"]["fileName"], json!("a.bin"));

    // Script counters to completion and check the filter buckets.
    harness.state.engine.update_item(&gid, |item| {
        item.active = false;
        item.total_length = 100;
        item.completed_length = 100;
    });
    let body = harness.call("download.status", json!({"gid": gid})).await;
    assert_eq!(body["result"]["status"], json!("complete"));

    let body = harness
        .call("download.list", json!({"status": "complete"}))
        .await;
    assert_eq!(body["result"]["downloads"].as_array().expect("array").len(), 1);
    let body = harness
        .call("download.list", json!({"status": "active"}))
        .await;
    assert!(body["result"]["downloads"].as_array().expect("array").is_empty());
    // Unknown filters fall back to "all".
    let body = harness
        .call("download.list", json!({"status": "unknown-status"}))
        .await;
    assert_eq!(body["result"]["downloads"].as_array().expect("array").len(), 1);

    // Pause/resume require a pool entry; add() created one.
    harness.state.engine.update_item(&gid, |item| item.active = true);
    let body = harness.call("download.pause", json!({"gid": gid})).await;
    assert!(body.get("error").is_none(), "pause failed: {body}");
    let body = harness.call("download.resume", json!({"gid": gid})).await;
    assert!(body.get("error").is_none(), "resume failed: {body}");

    // Remove rejects while active, succeeds after pause.
    let body = harness.call("download.remove", json!({"gid": gid})).await;
    assert_eq!(body["error"]["code"], json!(-32600));
    harness.call("download.pause", json!({"gid": gid})).await;
    let body = harness.call("download.remove", json!({"gid": gid})).await;
    assert!(body.get("error").is_none(), "remove failed: {body}");
    let body = harness.call("download.status", json!({"gid": gid})).await;
    assert_eq!(body["error"]["code"], json!(-32001));

    harness.stop().await;
}

#[tokio::test]
async fn cookie_file_feeds_add_and_is_reimported_on_resume() {
    let harness = Harness::start().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let cookie_file = dir.path().join("cookies.txt");
    std::fs::write(
        &cookie_file,
        "# Netscape HTTP Cookie File\n\
         example.com\tFALSE\t/\tFALSE\t0\tsid\ttoken-123\n",
    )
    .expect("write cookie fixture");

    let body = harness
        .call(
            "download.add",
            json!({
                "url": "http://example.com/f.bin",
                "cookieFile": cookie_file,
            }),
        )
        .await;
    let gid = body["result"]["gid"].as_str().expect("gid").to_owned();

    // The cookie-store path survives on the item, not the values.
    let item = harness.state.engine.get(&gid).expect("item");
    assert_eq!(item.cookie_file.as_deref(), Some(cookie_file.as_path()));

    harness.call("download.pause", json!({"gid": gid})).await;
    let body = harness.call("download.resume", json!({"gid": gid})).await;
    assert!(body.get("error").is_none(), "resume failed: {body}");

    let headers = harness
        .state
        .engine
        .resume_headers(&gid)
        .expect("resume captured headers");
    assert_eq!(
        headers,
        vec![("Cookie".to_owned(), "sid=token-123".to_owned())]
    );

    harness.stop().await;
}

#[tokio::test]
async fn get_version_reports_the_crate_version() {
    let harness = Harness::start().await;

    let body = harness.call("system.getVersion", json!(null)).await;
    assert_eq!(body["result"]["version"], json!(fetchd::version::VERSION));
    assert_eq!(body["id"], json!(1));

    harness.stop().await;
}
