//! Framed-protocol envelopes.
//!
//! A framed request is `{ "method": <string>, "data": <opaque JSON> }`;
//! the response is `{ "ok": bool, "error"?: string, "update"?:
//! { "type": <string>, "message": <opaque JSON> } }`.  Payloads are
//! opaque to the transport; the method handlers interpret them.

use serde::{Deserialize, Serialize};

/// One framed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramedRequest {
    pub method: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A typed update carried in a successful framed response, and in pool
/// broadcasts pushed to attached subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramedUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: serde_json::Value,
}

/// One framed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramedResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<FramedUpdate>,
}

impl FramedResponse {
    /// A success envelope carrying a typed update.
    pub fn ok(kind: impl Into<String>, message: serde_json::Value) -> Self {
        FramedResponse {
            ok: true,
            error: None,
            update: Some(FramedUpdate {
                kind: kind.into(),
                message,
            }),
        }
    }

    /// A failure envelope.  The framed loop keeps running after sending one.
    pub fn err(message: impl Into<String>) -> Self {
        FramedResponse {
            ok: false,
            error: Some(message.into()),
            update: None,
        }
    }
}
