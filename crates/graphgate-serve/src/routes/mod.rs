//! Route definitions for the gateway.
//!
//! ## Routes
//!
//! - `GET /` - Informational page
//! - `GET /health` - Health check (JSON)
//! - `GET /{format}?{graph}` - Render a graph (`svg`, `png`, `webp`, `pdf`, `plain`)
//! - `GET /favicon.ico`, `GET /robots.txt` - Fixed 404
//!
//! Anything else is answered with 400.

mod health;
mod home;
mod render;

use axum::Router;
use axum::http::{Method, header};
use axum::middleware;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

use crate::response::apply_baseline_headers;
use crate::state::AppState;

/// Build the complete gateway router.
///
/// The format token is resolved inside the handler rather than by the route
/// table, so probe paths, unknown formats and formats the renderer lacks all
/// go through the same resolver.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(render::root))
        .route("/health", get(health::health_check))
        .route("/{token}", get(render::render_token))
        .fallback(render::malformed_request)
        .method_not_allowed_fallback(render::malformed_request)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(middleware::map_response_with_state(
            state.clone(),
            apply_baseline_headers,
        ))
        .with_state(state)
}
