//! Core pipeline for the graphgate rendering gateway.
//!
//! This crate turns a request's format token and raw query string into a
//! rendered artifact:
//! - Format resolution: path token → renderer flag + content type
//! - Payload decoding: percent → base64 → gzip, each gated on a signature
//! - Renderer invocation: one `dot`-style process per request, with a
//!   time budget and forced termination
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod decode;
pub mod format;
pub mod metrics;
pub mod render;

pub use decode::{DecodeStage, DecodedPayload, PayloadDecoder};
pub use error::{Error, FRAGMENT_LIMIT, Result, fragment};
pub use format::{FormatSet, OutputFormat, Route, resolve};
pub use render::{RenderFailure, RenderOutcome, Renderer, RendererProbe};
