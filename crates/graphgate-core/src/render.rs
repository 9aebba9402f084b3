//! Renderer process invocation.
//!
//! Every request spawns its own renderer process: `<program> -T<format>`,
//! graph source on stdin, artifact on stdout, diagnostics on stderr. The
//! child is spawned with `kill_on_drop`, so any exit path that drops the wait
//! future (timeout, cancelled request) kills and reaps the process.

use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::decode::DecodedPayload;
use crate::error::{Error, Result};
use crate::format::{FormatSet, OutputFormat};
use crate::metrics;

/// Default renderer executable.
pub const DEFAULT_RENDERER: &str = "dot";

/// Default time budget for one renderer invocation.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Separator between the sections of a failure diagnostic.
const SECTION_BREAK: &[u8] = b"\n\n\n\n";

/// Marker preceding the format list in the renderer's `-T?` diagnostics.
const FORMAT_LIST_MARKER: &str = "Use one of:";

/// What the renderer reported about itself at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererProbe {
    /// Version text printed by `-V`.
    pub version: String,
    /// Output formats the renderer accepts.
    pub formats: FormatSet,
}

/// A renderer run that did not produce an artifact.
#[derive(Debug, Clone)]
pub struct RenderFailure {
    /// Process error: spawn failure or exit status.
    pub error: String,
    /// Everything the renderer wrote to stderr.
    pub stderr: Vec<u8>,
    /// Whatever the renderer wrote to stdout before failing.
    pub stdout: Vec<u8>,
    /// The decoded payload that was fed to the renderer.
    pub payload: Vec<u8>,
}

impl RenderFailure {
    /// Process error, stderr, partial stdout and the payload, each section
    /// followed by blank lines, so the failure can be reproduced from the
    /// response body alone.
    pub fn diagnostic(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(
            self.error.len() + self.stderr.len() + self.stdout.len() + self.payload.len() + 32,
        );
        body.extend_from_slice(b"Error: ");
        body.extend_from_slice(self.error.as_bytes());
        for section in [&self.stderr, &self.stdout, &self.payload] {
            body.extend_from_slice(SECTION_BREAK);
            body.extend_from_slice(section);
        }
        body.extend_from_slice(SECTION_BREAK);
        body
    }
}

/// Result of one renderer invocation.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// Exit status zero; stdout is the artifact.
    Rendered {
        bytes: Vec<u8>,
        content_type: &'static str,
    },
    /// Spawn failure or non-zero exit.
    Failed(RenderFailure),
}

impl RenderOutcome {
    /// Convert a failure into [`Error::RendererInvocationFailed`].
    pub fn into_result(self) -> Result<(Vec<u8>, &'static str)> {
        match self {
            Self::Rendered {
                bytes,
                content_type,
            } => Ok((bytes, content_type)),
            Self::Failed(failure) => Err(Error::RendererInvocationFailed(Box::new(failure))),
        }
    }
}

/// Handle to the external renderer executable.
#[derive(Debug, Clone)]
pub struct Renderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_RENDERER)
    }
}

impl Renderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    /// Arguments placed before the format flag, e.g. for a wrapper program.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, flag: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(flag).kill_on_drop(true);
        cmd
    }

    /// Query the renderer's version and supported formats.
    ///
    /// Fails with [`Error::RendererUnavailable`] when the version query
    /// cannot be run or exits non-zero. The format query is best effort:
    /// when its output cannot be parsed every format stays enabled.
    pub async fn probe(&self) -> Result<RendererProbe> {
        let output = self.run_probe("-V").await?;
        if !output.status.success() {
            return Err(Error::RendererUnavailable(format!(
                "'{} -V' exited with {}",
                self.program, output.status
            )));
        }

        // Graphviz prints its version on stderr.
        let mut version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            version = String::from_utf8_lossy(&output.stderr).trim().to_string();
        }

        let formats = match self.run_probe("-T?").await {
            Ok(output) => {
                let listing = String::from_utf8_lossy(&output.stderr);
                parse_supported_formats(&listing).unwrap_or_else(|| {
                    tracing::debug!("renderer format list not recognised, enabling all formats");
                    FormatSet::all()
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "renderer format probe failed, enabling all formats");
                FormatSet::all()
            }
        };

        Ok(RendererProbe { version, formats })
    }

    async fn run_probe(&self, flag: &str) -> Result<Output> {
        let mut cmd = self.command(flag);
        cmd.stdin(Stdio::null());

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(Error::RendererUnavailable(format!(
                "failed to run '{} {flag}': {e}",
                self.program
            ))),
            Err(_) => Err(Error::RendererUnavailable(format!(
                "'{} {flag}' did not finish within {}s",
                self.program,
                self.timeout.as_secs_f64()
            ))),
        }
    }

    /// Render `payload` in `format`.
    ///
    /// Returns `Err` only when the time budget elapses; renderer failures are
    /// reported as [`RenderOutcome::Failed`].
    pub async fn render(
        &self,
        payload: &DecodedPayload,
        format: OutputFormat,
    ) -> Result<RenderOutcome> {
        let started = Instant::now();
        metrics::increment(metrics::RENDER_INVOCATIONS, 1);

        let failure = |error: String, stdout: Vec<u8>, stderr: Vec<u8>| {
            metrics::increment(metrics::RENDER_FAILURES, 1);
            RenderOutcome::Failed(RenderFailure {
                error,
                stderr,
                stdout,
                payload: payload.as_bytes().to_vec(),
            })
        };

        let mut cmd = self.command(&format.renderer_flag());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(program = %self.program, error = %e, "failed to spawn renderer");
                return Ok(failure(
                    format!("failed to spawn renderer '{}': {e}", self.program),
                    Vec::new(),
                    Vec::new(),
                ));
            }
        };

        // Feed stdin while stdout/stderr drain so neither side blocks on a
        // full pipe. Dropping the handle closes the renderer's input.
        let stdin = child.stdin.take();
        let input = payload.as_bytes();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(input).await {
                    if e.kind() != ErrorKind::BrokenPipe {
                        tracing::warn!(error = %e, "failed to write payload to renderer");
                    }
                }
            }
        };
        let run = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to collect renderer output");
                return Ok(failure(
                    format!("failed to wait for renderer: {e}"),
                    Vec::new(),
                    Vec::new(),
                ));
            }
            Err(_) => {
                metrics::increment(metrics::RENDER_TIMEOUTS, 1);
                tracing::warn!(
                    format = %format,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "renderer timed out and was killed"
                );
                return Err(Error::RenderTimedOut {
                    after: self.timeout,
                });
            }
        };

        metrics::record_duration(metrics::RENDER_DURATION, started.elapsed());

        if output.status.success() {
            tracing::debug!(
                format = %format,
                bytes = output.stdout.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "render complete"
            );
            Ok(RenderOutcome::Rendered {
                bytes: output.stdout,
                content_type: format.content_type(),
            })
        } else {
            tracing::warn!(
                format = %format,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "renderer reported failure"
            );
            Ok(failure(
                format!("renderer exited with {}", output.status),
                output.stdout,
                output.stderr,
            ))
        }
    }
}

/// Parse the format list the renderer prints for an unknown `-T` value.
///
/// Entries may carry a renderer suffix (`png:cairo`); only the part before
/// the first colon is matched. Returns `None` when the marker is missing or
/// no entry matches a known format.
pub fn parse_supported_formats(listing: &str) -> Option<FormatSet> {
    let (_, list) = listing.split_once(FORMAT_LIST_MARKER)?;

    let formats = FormatSet::from_formats(
        list.split_whitespace()
            .filter_map(|entry| entry.split(':').next())
            .filter_map(OutputFormat::from_token),
    );

    (!formats.is_empty()).then_some(formats)
}
