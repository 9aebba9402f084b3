//! HTTP error mapping for the gateway.
//!
//! Every error becomes a `text/plain` response whose body starts with
//! `Error: `. Client errors echo the failing stage and input fragment;
//! renderer failures return the full diagnostic so the failure can be
//! reproduced from the response alone.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use graphgate_core::{Error, metrics};

use crate::response::{TEXT_PLAIN, build_response};

/// Gateway error type that converts to a plain-text HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request pipeline error (format, decoding, rendering).
    #[error(transparent)]
    Pipeline(#[from] Error),

    /// Every render slot stayed busy for the whole queue timeout.
    #[error("Renderer capacity exhausted, try again later")]
    Overloaded,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Pipeline(err) => match err {
                Error::MalformedRequestLine(_)
                | Error::UnknownFormat(_)
                | Error::EmptyPayload
                | Error::InvalidPercentEncoding { .. }
                | Error::InvalidBase64 { .. }
                | Error::InvalidCompression { .. } => StatusCode::BAD_REQUEST,
                Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                Error::ReservedPathNotFound(_) => StatusCode::NOT_FOUND,
                Error::RenderTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                Error::RendererInvocationFailed(_) | Error::RendererUnavailable(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Label used for the outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Overloaded => "overloaded",
            Self::Pipeline(err) => err.kind(),
        }
    }

    /// Response body bytes.
    pub fn body(&self) -> Vec<u8> {
        match self {
            Self::Pipeline(Error::RendererInvocationFailed(failure)) => failure.diagnostic(),
            other => format!("Error: {other}").into_bytes(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Pipeline(err) if err.is_client_error() => {
                tracing::debug!(kind = self.kind(), error = %err, "rejected request");
            }
            Self::Pipeline(Error::RendererInvocationFailed(failure)) => {
                tracing::error!(error = %failure.error, "render failed");
            }
            other => {
                tracing::warn!(kind = other.kind(), error = %other, "request failed");
            }
        }
        metrics::record_outcome(self.kind());

        build_response(status, TEXT_PLAIN, self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphgate_core::RenderFailure;
    use std::time::Duration;

    #[test]
    fn client_errors_map_to_400() {
        let errors = [
            Error::MalformedRequestLine("POST /svg".into()),
            Error::UnknownFormat("gif".into()),
            Error::EmptyPayload,
            Error::InvalidPercentEncoding {
                fragment: "%zz".into(),
                reason: "bad".into(),
            },
            Error::InvalidBase64 {
                fragment: "abc=".into(),
                reason: "bad".into(),
            },
            Error::InvalidCompression {
                fragment: "H4sIAAAA".into(),
                reason: "corrupt deflate stream".into(),
            },
        ];
        for err in errors {
            assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn other_errors_map_to_their_status() {
        assert_eq!(
            ApiError::from(Error::ReservedPathNotFound("favicon.ico".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(Error::PayloadTooLarge { limit: 10 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(Error::RenderTimedOut {
                after: Duration::from_secs(1)
            })
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(ApiError::Overloaded.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn body_names_unknown_token() {
        let body = ApiError::from(Error::UnknownFormat("gif".into())).body();
        assert_eq!(body, b"Error: Unknown format specified: 'gif'");
    }

    #[test]
    fn reserved_path_body_is_fixed() {
        let body = ApiError::from(Error::ReservedPathNotFound("robots.txt".into())).body();
        assert_eq!(body, b"Error: file not found");
    }

    #[test]
    fn render_failure_body_is_full_diagnostic() {
        let failure = RenderFailure {
            error: "renderer exited with exit status: 1".into(),
            stderr: b"Error: <stdin>: syntax error in line 1".to_vec(),
            stdout: Vec::new(),
            payload: b"digraph{".to_vec(),
        };
        let err = ApiError::from(Error::RendererInvocationFailed(Box::new(failure)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(err.body()).unwrap();
        assert!(body.contains("exit status: 1"));
        assert!(body.contains("syntax error in line 1"));
        assert!(body.contains("digraph{"));
    }

    #[test]
    fn into_response_sets_plain_text() {
        let response = ApiError::from(Error::EmptyPayload).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            TEXT_PLAIN
        );
    }
}
