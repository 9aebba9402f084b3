//! Response framing.
//!
//! [`build_response`] sets status, content type and an explicit
//! content length. [`apply_baseline_headers`] runs as a router-wide
//! middleware and stamps the fixed header set onto every response,
//! including fallbacks, health checks and CORS preflight answers.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::Response;

use crate::state::AppState;

/// Content type for diagnostics and informational bodies.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Header carrying the probed renderer version.
pub const RENDERER_VERSION_HEADER: HeaderName = HeaderName::from_static("x-renderer-version");

/// `Server` header value identifying this gateway.
pub fn server_identity() -> HeaderValue {
    HeaderValue::from_static(concat!("graphgate/", env!("CARGO_PKG_VERSION")))
}

/// Build a complete response for one terminal outcome.
pub fn build_response(status: StatusCode, content_type: &str, body: Vec<u8>) -> Response {
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let content_length = HeaderValue::from(body.len());

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, content_length);
    response
}

/// Add the fixed header set to a response.
///
/// Connections are closed after each response; hyper honours
/// `Connection: close` on HTTP/1.
pub async fn apply_baseline_headers(
    State(state): State<AppState>,
    mut response: Response,
) -> Response {
    let headers = response.headers_mut();

    headers.insert(header::SERVER, server_identity());
    if let Some(version) = &state.renderer_header {
        headers.insert(RENDERER_VERSION_HEADER, version.clone());
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

    response
}
