//! Root path: a short plain-text description of the service.

use axum::http::StatusCode;
use axum::response::Response;

use crate::response::{TEXT_PLAIN, build_response};
use crate::state::AppState;

/// Render the informational root response.
pub fn home_response(state: &AppState) -> Response {
    let formats = state
        .formats
        .iter()
        .map(|f| f.token())
        .collect::<Vec<_>>()
        .join(", ");

    let body = format!(
        "graphgate {version}\n\
         \n\
         Render a Graphviz description by putting it in the query string:\n\
         \n\
         \x20   GET /svg?digraph{{a->b}}\n\
         \n\
         Formats: {formats}\n\
         \n\
         The description may be sent as plain text, percent-encoded text,\n\
         base64, or gzip compressed and then base64 encoded.\n\
         \n\
         Renderer: {renderer}\n",
        version = env!("CARGO_PKG_VERSION"),
        renderer = state.renderer_version,
    );

    build_response(StatusCode::OK, TEXT_PLAIN, body.into_bytes())
}
