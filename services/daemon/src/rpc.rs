//! Method handlers.
//!
//! One dispatcher serves both protocols: the framed loop and the
//! JSON-RPC bridge each route `method` + `params` here and wrap the
//! outcome in their own envelope.  Handlers validate params, call the
//! engine, and wire new downloads into the pool and notifier.

use crate::engine::{
    DownloadItem, DownloadSpec, DownloadStatus, Engine, EngineError, ResumeOptions,
};
use crate::state::{AppState, spawn_publisher};
use crate::version;
use fd_protocol::jsonrpc::{RpcError, error_codes};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub mod methods {
    pub const ADD: &str = "download.add";
    pub const STATUS: &str = "download.status";
    pub const LIST: &str = "download.list";
    pub const REMOVE: &str = "download.remove";
    pub const PAUSE: &str = "download.pause";
    pub const RESUME: &str = "download.resume";
    pub const GET_VERSION: &str = "system.getVersion";
}

/// Route one request to its handler.
pub async fn dispatch<E: Engine>(
    state: &AppState<E>,
    method: &str,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    match method {
        methods::ADD => download_add(state, params).await,
        methods::STATUS => download_status(state, params),
        methods::LIST => download_list(state, params),
        methods::REMOVE => download_remove(state, params).await,
        methods::PAUSE => download_pause(state, params).await,
        methods::RESUME => download_resume(state, params).await,
        methods::GET_VERSION => Ok(system_get_version()),
        _ => Err(RpcError::method_not_found(method)),
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddParams {
    #[serde(default)]
    url: String,
    dir: Option<PathBuf>,
    file_name: Option<String>,
    connections: Option<u8>,
    /// Cookie-store path; matching cookies become a `Cookie` header.
    cookie_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct GidParams {
    gid: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    status: Option<String>,
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = match params {
        Some(Value::Null) | None => json!({}),
        Some(other) => other,
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn download_add<E: Engine>(
    state: &AppState<E>,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let params: AddParams = parse(params)?;
    let url = params.url.trim().to_owned();
    if url.is_empty() {
        return Err(RpcError::invalid_params("missing url"));
    }

    let mut spec = DownloadSpec {
        url,
        dir: params.dir,
        file_name: params.file_name,
        connections: params.connections,
        headers: Vec::new(),
        cookie_file: None,
    };

    if let Some(cookie_file) = params.cookie_file {
        let host = host_of(&spec.url)
            .ok_or_else(|| RpcError::invalid_params("url has no host for cookie matching"))?;
        let (cookies, source) = fd_cookies::import(&cookie_file, &host)
            .map_err(|e| RpcError::invalid_params(format!("cookie import: {e}")))?;
        debug!(
            browser = %source.browser,
            matched = cookies.len(),
            "imported cookies for download"
        );
        if !cookies.is_empty() {
            spec.headers.push(("Cookie".to_owned(), cookie_header(&cookies)));
        }
        spec.cookie_file = Some(cookie_file);
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let gid = state.engine.add(spec, events_tx).map_err(engine_error)?;
    state.pool.add(&gid, None).await;
    spawn_publisher(state.clone(), gid.clone(), events_rx);
    info!(gid = %gid, "download added");
    Ok(json!({ "gid": gid }))
}

fn download_status<E: Engine>(
    state: &AppState<E>,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let params: GidParams = parse(params)?;
    let item = state
        .engine
        .get(&params.gid)
        .ok_or_else(|| not_found(&params.gid))?;
    Ok(item_json(&item))
}

fn download_list<E: Engine>(
    state: &AppState<E>,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let params: ListParams = parse(params)?;
    let items = state.engine.list();
    // Anything other than the three known filters means "all".
    let filter = match params.status.as_deref() {
        Some("active") => Some(DownloadStatus::Active),
        Some("waiting") => Some(DownloadStatus::Waiting),
        Some("complete") => Some(DownloadStatus::Complete),
        _ => None,
    };
    let downloads: Vec<Value> = items
        .iter()
        .filter(|item| filter.is_none_or(|f| DownloadStatus::of(item) == f))
        .map(item_json)
        .collect();
    Ok(json!({ "downloads": downloads }))
}

async fn download_remove<E: Engine>(
    state: &AppState<E>,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let params: GidParams = parse(params)?;
    if state.engine.get(&params.gid).is_none() {
        return Err(not_found(&params.gid));
    }
    state.engine.flush(&params.gid).map_err(engine_error)?;
    for subscriber in state.pool.stop(&params.gid).await {
        subscriber.close().await;
    }
    info!(gid = %params.gid, "download removed");
    Ok(json!({}))
}

async fn download_pause<E: Engine>(
    state: &AppState<E>,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let params: GidParams = parse(params)?;
    if !state.pool.has(&params.gid).await {
        return Err(not_active(&params.gid));
    }
    state.engine.pause(&params.gid).map_err(engine_error)?;
    Ok(json!({}))
}

async fn download_resume<E: Engine>(
    state: &AppState<E>,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let params: GidParams = parse(params)?;
    if !state.pool.has(&params.gid).await {
        return Err(not_active(&params.gid));
    }

    // The item keeps only the cookie-store path; re-import for the new
    // attempt.  A store that disappeared since add is not fatal here.
    let mut opts = ResumeOptions::default();
    if let Some(item) = state.engine.get(&params.gid) {
        if let (Some(cookie_file), Some(host)) = (item.cookie_file, host_of(&item.url)) {
            match fd_cookies::import(&cookie_file, &host) {
                Ok((cookies, _source)) if !cookies.is_empty() => {
                    opts.headers.push(("Cookie".to_owned(), cookie_header(&cookies)));
                }
                Ok(_) => {}
                Err(e) => debug!(gid = %params.gid, error = %e, "cookie re-import failed"),
            }
        }
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    state
        .engine
        .resume(&params.gid, opts, events_tx)
        .map_err(engine_error)?;
    // Rewire: progress keeps flowing to framed subscribers and observers.
    spawn_publisher(state.clone(), params.gid.clone(), events_rx);
    Ok(json!({}))
}

fn system_get_version() -> Value {
    let mut result = json!({ "version": version::VERSION });
    if let Some(commit) = version::commit() {
        result["commit"] = json!(commit);
    }
    if let Some(build_type) = version::build_type() {
        result["buildType"] = json!(build_type);
    }
    result
}

// ---------------------------------------------------------------------------
// Mapping helpers
// ---------------------------------------------------------------------------

fn item_json(item: &DownloadItem) -> Value {
    json!({
        "gid": item.gid,
        "status": DownloadStatus::of(item).as_str(),
        "fileName": item.file_name,
        "totalLength": item.total_length,
        "completedLength": item.completed_length,
    })
}

fn not_found(gid: &str) -> RpcError {
    RpcError::new(
        error_codes::DOWNLOAD_NOT_FOUND,
        format!("download not found: {gid}"),
    )
}

fn not_active(gid: &str) -> RpcError {
    RpcError::new(
        error_codes::DOWNLOAD_NOT_ACTIVE,
        format!("download not active: {gid}"),
    )
}

fn engine_error(err: EngineError) -> RpcError {
    match err {
        EngineError::UnsupportedScheme(scheme) => {
            RpcError::invalid_params(format!("unsupported scheme: {scheme}"))
        }
        EngineError::InvalidUrl => RpcError::invalid_params("missing or invalid url"),
        EngineError::NotFound(gid) => not_found(&gid),
        EngineError::NotActive(gid) => not_active(&gid),
        other => RpcError::new(error_codes::INVALID_REQUEST, other.to_string()),
    }
}

/// Host component of a URL, without port, brackets, or userinfo.
fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = if let Some(v6) = host_port.strip_prefix('[') {
        v6.split(']').next().unwrap_or(v6)
    } else {
        host_port.split(':').next().unwrap_or(host_port)
    };
    (!host.is_empty()).then(|| host.to_owned())
}

fn cookie_header(cookies: &[fd_cookies::Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_handles_ports_userinfo_and_ipv6() {
        assert_eq!(host_of("http://example.com/f"), Some("example.com".into()));
        assert_eq!(
            host_of("https://example.com:8443/f?x=1"),
            Some("example.com".into())
        );
        assert_eq!(
            host_of("http://user:pw@example.com/f"),
            Some("example.com".into())
        );
        assert_eq!(host_of("http://[::1]:8080/f"), Some("::1".into()));
        assert_eq!(host_of("not-a-url"), None);
        assert_eq!(host_of("http:///path-only"), None);
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let cookies = vec![
            fd_cookies::Cookie {
                name: "a".into(),
                value: "1".into(),
                domain: "example.com".into(),
                path: "/".into(),
                expires: 0,
                secure: false,
                http_only: false,
            },
            fd_cookies::Cookie {
                name: "b".into(),
                value: "2".into(),
                domain: "example.com".into(),
                path: "/".into(),
                expires: 0,
                secure: false,
                http_only: true,
            },
        ];
        assert_eq!(cookie_header(&cookies), "a=1; b=2");
    }

    #[test]
    fn version_result_carries_the_crate_version() {
        let result = system_get_version();
        assert_eq!(result["version"], json!(version::VERSION));
    }
}
