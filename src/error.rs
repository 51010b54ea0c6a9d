//! Request-scoped proxy errors.

use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::http::buffering::StagingError;

/// Failure to obtain an upstream response.
///
/// Every variant is answered with an empty 500; the detail only goes to the
/// log.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("creating request: {0}")]
    UpstreamConstruction(String),

    #[error("performing the request: {0}")]
    UpstreamTransport(#[from] hyper_util::client::legacy::Error),

    #[error("performing the request: no response within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("staging request body: {0}")]
    Staging(#[from] StagingError),
}

impl From<axum::http::Error> for ProxyError {
    fn from(e: axum::http::Error) -> Self {
        ProxyError::UpstreamConstruction(e.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        empty_response(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// A response with the given status and no body.
pub fn empty_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
