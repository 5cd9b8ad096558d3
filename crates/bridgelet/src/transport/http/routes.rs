//! HTTP forwarding handler.
//!
//! A single fallback route catches every method and path. The whole
//! incoming request - method, headers, peer address, URI, raw body - is
//! forwarded verbatim as a request record, and whatever bytes come back on
//! the correlation path are written as the response body. The body is the
//! response: no status-code signaling happens on this layer in the base
//! configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::bridge::protocol::{RequestId, RequestRecord, ResponseLog};
use crate::registry::WaitError;
use crate::service::BridgeService;

fn header_map(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for key in headers.keys() {
        let values = headers
            .get_all(key)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();
        map.insert(key.as_str().to_string(), values);
    }
    map
}

async fn forward_request(
    State(service): State<Arc<BridgeService>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let start = Instant::now();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Fatal for this request only; the process and other in-flight
            // requests are unaffected.
            tracing::error!(error = %e, "failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let record = RequestRecord {
        method: parts.method.to_string(),
        header: header_map(&parts.headers),
        remote_addr: remote_addr.to_string(),
        uri: parts.uri.to_string(),
        body: body.to_vec(),
        request_id: RequestId::new(),
    };
    let request_id = record.request_id;

    let pending = match service.submit(record).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(%request_id, error = %e, "failed to forward request");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let response = match pending.resolve(service.response_deadline()).await {
        Ok(response) => response,
        Err(e @ WaitError::TimedOut) => {
            tracing::warn!(%request_id, error = %e, "gave up waiting for response");
            return StatusCode::GATEWAY_TIMEOUT.into_response();
        }
        Err(e @ WaitError::Closed) => {
            tracing::error!(%request_id, error = %e, "waiter closed without delivery");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let body = response.body.clone();
    let log = ResponseLog::completed(response, start.elapsed());
    if let Err(e) = service.emitter().emit_log(&log).await {
        tracing::error!(%request_id, error = %e, "failed to emit completion record");
    }

    body.into_response()
}

pub fn routes(service: Arc<BridgeService>) -> Router {
    Router::new()
        .fallback(forward_request)
        .with_state(service)
}
