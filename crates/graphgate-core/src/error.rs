//! Error types for the graphgate rendering pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::render::RenderFailure;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of characters of client input echoed back in a diagnostic.
pub const FRAGMENT_LIMIT: usize = 64;

/// Errors that can terminate a rendering request.
///
/// Every variant except [`Error::RendererUnavailable`] is request-scoped and
/// maps onto exactly one HTTP response. `RendererUnavailable` only occurs at
/// startup and is fatal to the service.
#[derive(Error, Debug)]
pub enum Error {
    /// The request does not have the shape of a graph-rendering request.
    #[error("Malformed request: {0}")]
    MalformedRequestLine(String),

    /// The path segment is not a known output format.
    #[error("Unknown format specified: '{0}'")]
    UnknownFormat(String),

    /// The query string is missing or empty.
    #[error("No query specified (the part after the questionmark)")]
    EmptyPayload,

    /// Percent-decoding of the query string failed.
    #[error("Failed to decode query '{fragment}': {reason}")]
    InvalidPercentEncoding {
        /// Leading part of the offending input.
        fragment: String,
        /// What the decoder rejected.
        reason: String,
    },

    /// The query looked like base64 but did not decode.
    #[error("Failed to decode base64 '{fragment}': {reason}")]
    InvalidBase64 {
        /// Leading part of the offending input.
        fragment: String,
        /// What the decoder rejected.
        reason: String,
    },

    /// The base64 payload carried a gzip signature but did not inflate.
    #[error("Failed to inflate gzip '{fragment}': {reason}")]
    InvalidCompression {
        /// Leading part of the base64 input that carried the gzip data.
        fragment: String,
        /// What the inflater rejected.
        reason: String,
    },

    /// The decoded payload exceeds the configured cap.
    #[error("Payload exceeds the limit of {limit} bytes")]
    PayloadTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// The renderer ran but reported failure.
    #[error("{}", .0.error)]
    RendererInvocationFailed(Box<RenderFailure>),

    /// The renderer did not finish within its time budget and was killed.
    #[error("Renderer did not finish within {}s", .after.as_secs_f64())]
    RenderTimedOut {
        /// The budget that elapsed.
        after: Duration,
    },

    /// A browser probe path such as `/favicon.ico`.
    #[error("file not found")]
    ReservedPathNotFound(String),

    /// The renderer executable could not be probed at startup.
    #[error("renderer unavailable: {0}")]
    RendererUnavailable(String),
}

impl Error {
    /// True for errors caused by the client's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequestLine(_)
                | Self::UnknownFormat(_)
                | Self::EmptyPayload
                | Self::InvalidPercentEncoding { .. }
                | Self::InvalidBase64 { .. }
                | Self::InvalidCompression { .. }
                | Self::PayloadTooLarge { .. }
                | Self::ReservedPathNotFound(_)
        )
    }

    /// Short, stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequestLine(_) => "malformed_request",
            Self::UnknownFormat(_) => "unknown_format",
            Self::EmptyPayload => "empty_payload",
            Self::InvalidPercentEncoding { .. } => "invalid_percent_encoding",
            Self::InvalidBase64 { .. } => "invalid_base64",
            Self::InvalidCompression { .. } => "invalid_compression",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RendererInvocationFailed(_) => "render_failed",
            Self::RenderTimedOut { .. } => "render_timeout",
            Self::ReservedPathNotFound(_) => "reserved_path",
            Self::RendererUnavailable(_) => "renderer_unavailable",
        }
    }
}

/// Truncate client input to [`FRAGMENT_LIMIT`] characters for diagnostics.
pub fn fragment(input: &str) -> String {
    match input.char_indices().nth(FRAGMENT_LIMIT) {
        Some((idx, _)) => format!("{}...", &input[..idx]),
        None => input.to_string(),
    }
}
