//! JSON-RPC 2.0 bridge: HTTP POST and WebSocket mount points.
//!
//! Both routes sit behind the bearer gate.  The gate fails closed: an
//! empty configured secret rejects every request, so a missing
//! configuration can never expose the RPC surface.  Rejections carry the
//! frozen envelope `{"jsonrpc":"2.0","error":{"code":-32600,"message":
//! "Unauthorized"},"id":null}` with HTTP 401.

use crate::engine::Engine;
use crate::rpc;
use crate::state::AppState;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use fd_protocol::jsonrpc::{RpcError, RpcRequest, RpcResponse, error_codes};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::debug;

/// Build the bridge router.
pub fn router<E: Engine>(state: AppState<E>) -> Router {
    Router::new()
        .route("/jsonrpc", post(http_rpc::<E>))
        .route("/jsonrpc/ws", get(ws_rpc::<E>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Bearer gate
// ---------------------------------------------------------------------------

/// Check `Authorization: Bearer <secret>` against the configured secret.
///
/// Comparison goes through SHA-256 digests so timing does not depend on
/// where the candidate diverges.
pub fn authorized(secret: &str, headers: &HeaderMap) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    Sha256::digest(token.as_bytes()) == Sha256::digest(secret.as_bytes())
}

fn unauthorized() -> Response {
    let body = RpcResponse::failure(
        None,
        RpcError::new(error_codes::INVALID_REQUEST, "Unauthorized"),
    );
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Shared request handling
// ---------------------------------------------------------------------------

/// Parse and dispatch one JSON-RPC payload.  Returns `None` for
/// notifications (which get no response); parse failures always get the
/// −32700 envelope with a null id.
pub async fn handle_payload<E: Engine>(
    state: &AppState<E>,
    payload: &[u8],
) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_slice(payload) {
        Ok(request) => request,
        Err(_) => {
            return Some(RpcResponse::failure(
                None,
                RpcError::new(error_codes::PARSE_ERROR, "parse error"),
            ));
        }
    };
    let is_notification = request.is_notification();
    let id = request.id.clone();
    let outcome = rpc::dispatch(state, &request.method, request.params).await;
    if is_notification {
        return None;
    }
    Some(match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    })
}

// ---------------------------------------------------------------------------
// HTTP POST /jsonrpc
// ---------------------------------------------------------------------------

async fn http_rpc<E: Engine>(
    State(state): State<AppState<E>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&state.rpc_secret, &headers) {
        return unauthorized();
    }
    match handle_payload(&state, &body).await {
        Some(reply) => Json(reply).into_response(),
        // A notification over HTTP gets an empty 204.
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// ---------------------------------------------------------------------------
// WebSocket /jsonrpc/ws
// ---------------------------------------------------------------------------

async fn ws_rpc<E: Engine>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<E>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state.rpc_secret, &headers) {
        return unauthorized();
    }
    ws.on_upgrade(move |socket| serve_ws(socket, state))
}

/// One JSON-RPC server per WebSocket.  The socket task owns the sink, so
/// responses and push notifications are serialized per connection by
/// construction.  Registration/deregistration with the notifier brackets
/// the session.
async fn serve_ws<E: Engine>(mut socket: WebSocket, state: AppState<E>) {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let observer = state.notifier.register(out_tx).await;
    debug!(observer, "rpc websocket connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_payload(&state, text.as_bytes()).await {
                        let Ok(body) = serde_json::to_string(&reply) else { break };
                        if socket.send(Message::Text(body.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = socket.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            outgoing = out_rx.recv() => match outgoing {
                Some(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    state.notifier.unregister(observer).await;
    debug!(observer, "rpc websocket disconnected");
}
