//! Per-request proxy flow.
//!
//! ```text
//! global failure roll ──fail──▶ 500
//!   │
//! prefix lookup ───────match──▶ configured status
//!   │
//! count method → [stage body] → upstream call ──error──▶ 500
//!   │
//! status + headers, body streamed through FaultyTransfer
//! ```

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{self, HeaderValue};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use hyper::body::Body as _;

use crate::error::{empty_response, ProxyError};
use crate::http::buffering::StagedBody;
use crate::http::request::{
    build_upstream_request, content_length, end_to_end_headers, forwarded_headers, inbound_host,
    request_id,
};
use crate::http::server::AppState;
use crate::http::transfer::{FaultyTransfer, TransferLog};

/// Main proxy handler.
pub async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let request_id = request_id(request.headers());
    let method = request.method().clone();
    let uri = request.uri().to_string();

    if state.faults.should_fail() {
        tracing::warn!(request_id = %request_id, method = %method, "failing request to: {}", uri);
        return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
    }

    if let Some(code) = state.faults.should_fail_by_prefix(request.uri().path()) {
        tracing::warn!(
            request_id = %request_id,
            method = %method,
            code,
            "failing request due to prefix match: {}",
            uri
        );
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return empty_response(status);
    }

    state.counters.add(method.as_str(), 1);

    match forward(&state, client, request, &request_id).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, method = %method, uri = %uri, error = %e, "Upstream error");
            e.into_response()
        }
    }
}

async fn forward(
    state: &AppState,
    client: SocketAddr,
    request: Request<Body>,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    let host = inbound_host(&parts.headers, &parts.uri);
    let mut headers = forwarded_headers(&parts.headers, client, host.as_deref());
    let declared_length = content_length(&parts.headers);

    let mut staged = None;
    let (body, request_bytes) =
        if state.stage_chunked_bodies && declared_length.is_none() && !body.is_end_stream() {
            let mut staging = StagedBody::stage(body).await?;
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(staging.len()));
            let body = staging.take_body();
            let length = staging.len();
            staged = Some(staging);
            (body, Some(length))
        } else {
            (body, declared_length)
        };

    let upstream = build_upstream_request(parts.method.clone(), &parts.uri, headers, body)?;

    tracing::debug!(request_id = %request_id, method = %parts.method, uri = %parts.uri, "Proxying request");
    let result = tokio::time::timeout(state.upstream_timeout, state.client.request(upstream)).await;

    if let Some(staging) = staged {
        staging.release();
    }

    let response = match result {
        Ok(response) => response?,
        Err(_) => return Err(ProxyError::UpstreamTimeout(state.upstream_timeout)),
    };

    let (upstream_parts, upstream_body) = response.into_parts();
    let log = TransferLog {
        request_id: request_id.to_string(),
        method: parts.method.clone(),
        uri: parts.uri.to_string(),
        status: upstream_parts.status,
        request_bytes,
        response_bytes: content_length(&upstream_parts.headers),
    };

    let mut response = empty_response(upstream_parts.status);
    *response.headers_mut() = end_to_end_headers(&upstream_parts.headers);

    if is_bodiless(&parts.method, upstream_parts.status) {
        log.emit(0, 0, false);
        return Ok(response);
    }

    let transfer = FaultyTransfer::new(upstream_body.into_data_stream(), state.faults.clone(), log);
    *response.body_mut() = Body::from_stream(transfer);
    Ok(response)
}

/// Responses that never carry a body, so there is nothing to stream.
fn is_bodiless(method: &Method, status: StatusCode) -> bool {
    method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}
