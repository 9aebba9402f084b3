//! Graphgate Serve - HTTP gateway that renders Graphviz descriptions.
//!
//! Probes the renderer once at startup and refuses to start if it cannot be
//! run. Handles SIGINT (Ctrl+C) and SIGTERM by finishing in-flight requests
//! before exiting.

use anyhow::Context;
use axum::http::Request;
use clap::Parser;
use graphgate_core::Renderer;
use graphgate_core::metrics::{init_metrics, start_metrics_server};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use graphgate_serve::config::debug_enabled;
use graphgate_serve::{AppState, Config, router};

/// Graphgate rendering gateway.
#[derive(Parser, Debug)]
#[command(name = "graphgate-serve")]
#[command(about = "HTTP gateway that renders Graphviz descriptions", long_about = None)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load .env file if it exists
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    // DEBUG raises the default level when RUST_LOG is not set
    let default_filter = if debug_enabled() {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();

    if let Some(port) = config.metrics_port {
        let handle = init_metrics();
        start_metrics_server(port, handle)
            .await
            .context("failed to start metrics server")?;
    }

    let renderer = Renderer::new(config.renderer.clone()).with_timeout(config.render_timeout);
    let probe = match renderer.probe().await {
        Ok(probe) => probe,
        Err(e) => {
            tracing::error!(renderer = %renderer.program(), error = %e, "renderer probe failed");
            return Err(e).context("renderer is not usable, refusing to start");
        }
    };
    tracing::info!(version = %probe.version, "renderer probed");

    let state = AppState::with_renderer(config, renderer, probe);

    let app = router(state).layer(TraceLayer::new_for_http().make_span_with(
        |request: &Request<_>| {
            tracing::span!(
                Level::INFO,
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                query = request.uri().query().unwrap_or("")
            )
        },
    ));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown signal received, stopping gracefully...");
}
