//! Graph rendering route.
//!
//! Handles `GET /{token}?{query}`: resolve the format, decode the query,
//! run the renderer, answer with the artifact. Each stage short-circuits the
//! rest: nothing is decoded after a format rejection and nothing is rendered
//! after a decode failure.

use axum::extract::{RawQuery, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use graphgate_core::{Error, OutputFormat, Route, metrics, resolve};

use super::home;
use crate::error::ApiError;
use crate::response::build_response;
use crate::state::AppState;

/// `GET /{token}` - every single-segment path.
///
/// The token is the raw path segment; escapes in it are not decoded, so
/// `/sv%67` is an unknown format rather than `svg`.
pub async fn render_token(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let token = uri.path().trim_start_matches('/');
    dispatch(&state, &method, &uri, token, query.as_deref()).await
}

/// `GET /` - the empty token.
pub async fn root(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    dispatch(&state, &method, &uri, "", query.as_deref()).await
}

/// Anything that is not a single-segment GET request.
pub async fn malformed_request(method: Method, uri: Uri) -> ApiError {
    Error::MalformedRequestLine(format!("{method} {}", uri.path())).into()
}

async fn dispatch(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    token: &str,
    query: Option<&str>,
) -> Result<Response, ApiError> {
    if state.config.debug {
        tracing::info!(
            method = %method,
            path = %uri.path(),
            query = query.unwrap_or(""),
            "request line"
        );
    }

    match resolve(token, state.formats)? {
        Route::Home => {
            metrics::record_outcome("home");
            Ok(home::home_response(state))
        }
        Route::Probe(path) => Err(Error::ReservedPathNotFound(path.to_string()).into()),
        Route::Render(format) => render_graph(state, format, query.unwrap_or("")).await,
    }
}

async fn render_graph(
    state: &AppState,
    format: OutputFormat,
    raw_query: &str,
) -> Result<Response, ApiError> {
    let payload = state.decoder.decode(raw_query)?;
    for stage in payload.stages() {
        metrics::record_stage(stage.as_str());
    }

    if state.config.debug {
        tracing::info!(
            format = %format,
            stages = ?payload.stages(),
            payload = %payload.to_text_lossy(),
            "decoded payload"
        );
    }

    let permit = match tokio::time::timeout(
        state.config.queue_timeout,
        state.render_slots.clone().acquire_owned(),
    )
    .await
    {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) | Err(_) => {
            metrics::increment(metrics::RENDER_REJECTED, 1);
            return Err(ApiError::Overloaded);
        }
    };
    update_inflight(state);

    let outcome = state.renderer.render(&payload, format).await;
    drop(permit);
    update_inflight(state);

    let (bytes, content_type) = outcome?.into_result()?;

    if state.config.debug {
        tracing::info!(
            status = 200,
            content_type,
            body = %String::from_utf8_lossy(&bytes),
            "outgoing response"
        );
    }

    metrics::record_outcome("rendered");
    Ok(build_response(StatusCode::OK, content_type, bytes))
}

fn update_inflight(state: &AppState) {
    let busy = state
        .config
        .max_concurrent_renders
        .saturating_sub(state.render_slots.available_permits());
    metrics::set_gauge(metrics::RENDER_INFLIGHT, busy as f64);
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use graphgate_core::{FormatSet, Renderer, RendererProbe};
    use std::io::Write;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::routes::router;

    fn state_with(script: &str, config: Config, formats: FormatSet) -> AppState {
        let renderer = Renderer::new("sh")
            .with_args(["-c", script, "fake-renderer"])
            .with_timeout(config.render_timeout);
        let probe = RendererProbe {
            version: "fake - graphviz version 9.9.9".to_string(),
            formats,
        };
        AppState::with_renderer(config, renderer, probe)
    }

    fn app(script: &str) -> Router {
        router(state_with(script, Config::default(), FormatSet::all()))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        send(app, Method::GET, uri).await
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = app.oneshot(request).await.expect("router should respond");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        (status, headers, body.to_vec())
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn assert_baseline_headers(headers: &axum::http::HeaderMap) {
        assert!(
            headers[header::SERVER]
                .to_str()
                .unwrap()
                .starts_with("graphgate/")
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::CONNECTION], "close");
        assert_eq!(
            headers["x-renderer-version"],
            "fake - graphviz version 9.9.9"
        );
    }

    #[tokio::test]
    async fn renders_percent_encoded_graph() {
        let (status, headers, body) = get(app("cat"), "/svg?digraph%20%7Ba-%3Eb%7D").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"digraph {a->b}");
        assert_eq!(headers[header::CONTENT_TYPE], "image/svg+xml; charset=utf-8");
        assert_eq!(headers[header::CONTENT_LENGTH], body.len().to_string().as_str());
        assert_baseline_headers(&headers);
    }

    #[tokio::test]
    async fn plain_query_reaches_renderer_unchanged() {
        let (status, headers, body) = get(app("cat"), "/plain?graph;x--y;y--z").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"graph;x--y;y--z");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn renders_base64_and_gzip_payloads() {
        let source = b"digraph { a -> b; b -> c; }";

        let uri = format!("/png?{}", STANDARD.encode(source));
        let (status, headers, body) = get(app("cat"), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, source);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");

        let uri = format!("/pdf?{}", STANDARD.encode(gzip(source)));
        let (status, headers, body) = get(app("cat"), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, source);
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    }

    #[tokio::test]
    async fn renderer_receives_format_flag() {
        let (status, _, body) = get(app(r#"printf '%s' "$1""#), "/webp?graph;a").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"-Twebp");
    }

    #[tokio::test]
    async fn unknown_format_is_rejected_before_rendering() {
        // The renderer would fail loudly if it were ever invoked.
        let (status, headers, body) = get(app("exit 99"), "/gif?digraph;a").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Error: Unknown format specified: 'gif'");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_baseline_headers(&headers);
    }

    #[tokio::test]
    async fn escaped_format_token_is_not_decoded() {
        let (status, headers, body) = get(app("exit 99"), "/sv%67?digraph;a").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Error: Unknown format specified: 'sv%67'");
        assert_baseline_headers(&headers);

        let (status, _, body) = get(app("exit 99"), "/%FF?digraph;a").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Error: Unknown format specified: '%FF'");
    }

    #[tokio::test]
    async fn format_missing_from_renderer_is_unknown() {
        let formats = FormatSet::from_formats([OutputFormat::Svg]);
        let app = router(state_with("cat", Config::default(), formats));
        let (status, _, body) = get(app, "/webp?digraph;a").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("'webp'"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        for uri in ["/svg", "/svg?"] {
            let (status, _, body) = get(app("exit 99"), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(String::from_utf8_lossy(&body).contains("No query specified"));
        }
    }

    #[tokio::test]
    async fn invalid_percent_encoding_is_rejected() {
        let (status, _, body) = get(app("exit 99"), "/svg?digraph%20%zz").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("Failed to decode query"));
    }

    #[tokio::test]
    async fn corrupt_gzip_is_rejected() {
        let mut data = graphgate_core::decode::GZIP_MAGIC.to_vec();
        data.extend_from_slice(&[0x00, 0, 0, 0, 0, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff]);
        let encoded = STANDARD.encode(&data);
        let (status, _, body) = get(app("exit 99"), &format!("/svg?{encoded}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = String::from_utf8_lossy(&body);
        assert!(body.starts_with("Error: Failed to inflate gzip"));
        assert!(body.contains(&encoded));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let config = Config {
            max_payload_bytes: 16,
            ..Config::default()
        };
        let app = router(state_with("cat", config, FormatSet::all()));
        let uri = format!("/svg?{}", STANDARD.encode(gzip(&[b'a'; 4096])));
        let (status, _, _) = get(app, &uri).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn renderer_failure_returns_full_diagnostic() {
        let script = "cat >/dev/null; printf half; echo 'syntax error in line 1 near ->' >&2; exit 1";
        let (status, headers, body) = get(app(script), "/svg?digraph;a-%3E").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        let body = String::from_utf8(body).unwrap();
        assert!(body.starts_with("Error: renderer exited with"));
        assert!(body.contains("syntax error in line 1"));
        assert!(body.contains("half"));
        assert!(body.contains("digraph;a-%3E"));
    }

    #[tokio::test]
    async fn slow_renderer_times_out() {
        let config = Config {
            render_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let app = router(state_with("exec sleep 10", config, FormatSet::all()));
        let (status, headers, body) = get(app, "/svg?digraph;a").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(String::from_utf8_lossy(&body).contains("did not finish"));
        assert_baseline_headers(&headers);
    }

    #[tokio::test]
    async fn busy_render_slots_return_503() {
        let config = Config {
            max_concurrent_renders: 1,
            queue_timeout: Duration::from_millis(50),
            ..Config::default()
        };
        let state = state_with("cat", config, FormatSet::all());
        let _held = state.render_slots.clone().acquire_owned().await.unwrap();
        let (status, _, body) = get(router(state.clone()), "/svg?digraph;a").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(String::from_utf8_lossy(&body).contains("capacity"));
    }

    #[tokio::test]
    async fn reserved_probes_return_404() {
        for uri in ["/favicon.ico", "/robots.txt"] {
            let (status, headers, body) = get(app("exit 99"), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, b"Error: file not found");
            assert_baseline_headers(&headers);
        }
    }

    #[tokio::test]
    async fn root_is_informational() {
        let (status, headers, body) = get(app("exit 99"), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        let body = String::from_utf8(body).unwrap();
        assert!(body.starts_with("graphgate "));
        assert!(body.contains("svg, png, webp, pdf, plain"));
        assert!(body.contains("fake - graphviz version 9.9.9"));
    }

    #[tokio::test]
    async fn health_reports_renderer() {
        let (status, headers, body) = get(app("exit 99"), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_baseline_headers(&headers);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["renderer"], "fake - graphviz version 9.9.9");
    }

    #[tokio::test]
    async fn non_get_and_nested_paths_are_malformed() {
        let (status, _, body) = send(app("cat"), Method::POST, "/svg?digraph;a").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("POST /svg"));

        let (status, headers, _) = get(app("cat"), "/svg/extra?digraph;a").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_baseline_headers(&headers);
    }

    #[tokio::test]
    async fn concurrent_requests_stay_isolated() {
        let app = app("cat");
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..12 {
            let app = app.clone();
            tasks.spawn(async move {
                let source = format!("digraph;n{i}--m{i}");
                let (status, _, body) = get(app, &format!("/plain?{source}")).await;
                (status, source, body)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let (status, source, body) = joined.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, source.as_bytes());
        }
    }
}
