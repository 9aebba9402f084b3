//! Graphgate Serve - HTTP gateway for Graphviz rendering
//!
//! Clients put a graph description in the query string and name the output
//! format in the path (`GET /svg?digraph{a->b}`). The description is decoded
//! (percent-encoding, base64, gzip), piped to the renderer executable and the
//! rendered artifact is returned as the response body.
//!
//! # Architecture
//!
//! - **AppState**: Configuration, renderer handle and the render admission gate
//! - **Routes**: Root, health and the single-segment render route
//! - **Response**: Framing and the baseline header set applied to every reply

pub mod config;
mod error;
pub mod response;
mod routes;
mod state;

pub use self::config::Config;
pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::AppState;
