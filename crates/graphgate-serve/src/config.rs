//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use graphgate_core::decode::DEFAULT_MAX_PAYLOAD_BYTES;
use graphgate_core::render::{DEFAULT_RENDER_TIMEOUT, DEFAULT_RENDERER};

/// Default number of renderer processes allowed to run at once.
const DEFAULT_MAX_CONCURRENT_RENDERS: usize = 16;

/// Default wait for a free render slot before answering 503.
const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Application configuration.
///
/// Built once at startup and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080").
    pub bind_addr: String,

    /// Renderer executable, invoked as `<renderer> -T<format>`.
    pub renderer: String,

    /// Time budget for a single renderer invocation.
    pub render_timeout: Duration,

    /// Maximum number of renderer processes running at once.
    pub max_concurrent_renders: usize,

    /// How long a request may wait for a render slot.
    pub queue_timeout: Duration,

    /// Cap on the decoded payload size in bytes.
    pub max_payload_bytes: usize,

    /// Port for the Prometheus `/metrics` endpoint, if enabled.
    pub metrics_port: Option<u16>,

    /// Verbose per-request tracing (request line, payload, response bytes).
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            renderer: DEFAULT_RENDERER.to_string(),
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            metrics_port: None,
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `GRAPHGATE_BIND_ADDR`: Server bind address (default: "0.0.0.0:8080")
    /// - `GRAPHGATE_RENDERER`: Renderer executable (default: "dot")
    /// - `GRAPHGATE_RENDER_TIMEOUT_SECS`: Per-render budget (default: 30)
    /// - `GRAPHGATE_MAX_CONCURRENT_RENDERS`: Admission gate size (default: 16)
    /// - `GRAPHGATE_QUEUE_TIMEOUT_SECS`: Wait for a render slot (default: 5)
    /// - `GRAPHGATE_MAX_PAYLOAD_BYTES`: Decoded payload cap (default: 1 MiB)
    /// - `GRAPHGATE_METRICS_PORT`: Prometheus exporter port (default: disabled)
    /// - `DEBUG`: `1` or `true` enables verbose request tracing
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_addr = std::env::var("GRAPHGATE_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let renderer = std::env::var("GRAPHGATE_RENDERER")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.renderer);

        let render_timeout = Duration::from_secs(parse_var(
            "GRAPHGATE_RENDER_TIMEOUT_SECS",
            defaults.render_timeout.as_secs(),
        )?);

        let max_concurrent_renders = parse_var(
            "GRAPHGATE_MAX_CONCURRENT_RENDERS",
            defaults.max_concurrent_renders,
        )?;
        if max_concurrent_renders == 0 {
            anyhow::bail!("GRAPHGATE_MAX_CONCURRENT_RENDERS must be greater than zero");
        }

        let queue_timeout = Duration::from_secs(parse_var(
            "GRAPHGATE_QUEUE_TIMEOUT_SECS",
            defaults.queue_timeout.as_secs(),
        )?);

        let max_payload_bytes =
            parse_var("GRAPHGATE_MAX_PAYLOAD_BYTES", defaults.max_payload_bytes)?;

        let metrics_port = match std::env::var("GRAPHGATE_METRICS_PORT") {
            Ok(value) if !value.trim().is_empty() => Some(
                value
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("GRAPHGATE_METRICS_PORT is not a port: {value:?}"))?,
            ),
            _ => None,
        };

        let debug_on = debug_enabled();

        tracing::info!(
            bind_addr = %bind_addr,
            renderer = %renderer,
            render_timeout_secs = render_timeout.as_secs(),
            max_concurrent_renders,
            queue_timeout_secs = queue_timeout.as_secs(),
            max_payload_bytes,
            metrics_port = ?metrics_port,
            debug = debug_on,
            "gateway configuration loaded"
        );

        Ok(Self {
            bind_addr,
            renderer,
            render_timeout,
            max_concurrent_renders,
            queue_timeout,
            max_payload_bytes,
            metrics_port,
            debug: debug_on,
        })
    }
}

/// Whether `DEBUG` asks for verbose request tracing.
pub fn debug_enabled() -> bool {
    std::env::var("DEBUG")
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}

/// Parse an optional environment variable, naming it in the error.
fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {value:?}")),
        _ => Ok(default),
    }
}
