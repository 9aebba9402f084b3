//! Application state shared across all request handlers.

use std::sync::Arc;

use axum::http::HeaderValue;
use graphgate_core::{FormatSet, PayloadDecoder, Renderer, RendererProbe};
use tokio::sync::Semaphore;

use crate::config::Config;

/// Shared, read-only state available to all request handlers.
///
/// Nothing in here is mutated after startup; the semaphore only hands out
/// render slots.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,

    /// Renderer handle with its time budget applied.
    pub renderer: Renderer,

    /// Payload decoder with the configured size cap.
    pub decoder: PayloadDecoder,

    /// Formats the installed renderer supports.
    pub formats: FormatSet,

    /// Renderer version reported at startup.
    pub renderer_version: Arc<str>,

    /// `X-Renderer-Version` value, absent if the version is not a valid header.
    pub renderer_header: Option<HeaderValue>,

    /// Admission gate bounding concurrent renderer processes.
    pub render_slots: Arc<Semaphore>,
}

impl AppState {
    /// Create the application state from configuration, the renderer that
    /// was probed at startup and its probe result.
    pub fn with_renderer(config: Config, renderer: Renderer, probe: RendererProbe) -> Self {
        let renderer_header = HeaderValue::from_str(&probe.version).ok();
        if renderer_header.is_none() {
            tracing::warn!(version = %probe.version, "renderer version is not a valid header value");
        }

        let decoder = PayloadDecoder::new(config.max_payload_bytes);
        let render_slots = Arc::new(Semaphore::new(config.max_concurrent_renders));

        tracing::info!(
            renderer = %renderer.program(),
            renderer_version = %probe.version,
            formats = ?probe.formats.iter().map(|f| f.token()).collect::<Vec<_>>(),
            render_slots = config.max_concurrent_renders,
            "application state initialized"
        );

        Self {
            config: Arc::new(config),
            renderer,
            decoder,
            formats: probe.formats,
            renderer_version: Arc::from(probe.version),
            renderer_header,
            render_slots,
        }
    }
}
