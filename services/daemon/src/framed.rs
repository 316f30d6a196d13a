//! Framed-RPC per-connection loop.
//!
//! Decode one framed request, dispatch, answer, repeat.  Unknown methods
//! produce an error envelope and the loop continues; a malformed frame
//! or request body is a protocol error and closes the connection.
//!
//! `download.attach` is framed-only: it registers the calling connection
//! as a pool subscriber for a gid, which is how clients receive the
//! broadcast progress stream.

use crate::conn::SyncConn;
use crate::engine::Engine;
use crate::rpc;
use crate::state::AppState;
use fd_protocol::frame::FrameError;
use fd_protocol::framed::{FramedRequest, FramedResponse};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

pub const METHOD_ATTACH: &str = "download.attach";

/// Serve one framed connection until EOF or protocol error.  The
/// connection is always closed on exit; the pool evicts it from any
/// subscription on the next broadcast that fails.
pub async fn serve_conn<E: Engine>(state: AppState<E>, conn: Arc<SyncConn>) {
    loop {
        let payload = match conn.read().await {
            Ok(payload) => payload,
            Err(FrameError::UnexpectedEnd) => break,
            Err(e) => {
                debug!(conn = conn.id(), error = %e, "framed read failed");
                break;
            }
        };

        let request: FramedRequest = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(e) => {
                // Protocol error: answer once, then drop the connection.
                let reply = FramedResponse::err(format!("malformed request: {e}"));
                let _ = write_response(&conn, &reply).await;
                break;
            }
        };

        let reply = handle_request(&state, &conn, request).await;
        if write_response(&conn, &reply).await.is_err() {
            break;
        }
    }
    conn.close().await;
    debug!(conn = conn.id(), "framed connection closed");
}

async fn handle_request<E: Engine>(
    state: &AppState<E>,
    conn: &Arc<SyncConn>,
    request: FramedRequest,
) -> FramedResponse {
    if request.method == METHOD_ATTACH {
        return attach(state, conn, &request.data).await;
    }

    let params = if request.data.is_null() {
        None
    } else {
        Some(request.data)
    };
    match rpc::dispatch(state, &request.method, params).await {
        Ok(result) => FramedResponse::ok(request.method, result),
        Err(error) => FramedResponse::err(error.message),
    }
}

async fn attach<E: Engine>(
    state: &AppState<E>,
    conn: &Arc<SyncConn>,
    data: &Value,
) -> FramedResponse {
    let Some(gid) = data.get("gid").and_then(Value::as_str) else {
        return FramedResponse::err("missing gid");
    };
    if state.pool.attach(gid, Arc::clone(conn)).await {
        FramedResponse::ok(METHOD_ATTACH, json!({ "gid": gid }))
    } else {
        FramedResponse::err(format!("download not found: {gid}"))
    }
}

async fn write_response(conn: &SyncConn, response: &FramedResponse) -> Result<(), FrameError> {
    let bytes = serde_json::to_vec(response).unwrap_or_else(|_| b"{\"ok\":false}".to_vec());
    conn.write(&bytes).await
}
