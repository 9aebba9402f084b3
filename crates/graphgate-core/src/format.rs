//! Output format resolution.
//!
//! The first path segment of a request selects both the renderer's `-T` flag
//! and the response content type. A couple of segments are reserved: the
//! empty root path answers with an informational page, and the probes that
//! browsers fire on their own (`/favicon.ico`, `/robots.txt`) answer with a
//! fixed 404 instead of a rendering attempt.

use std::fmt;

use crate::error::{Error, Result};

/// Paths that browsers request on their own.
pub const RESERVED_PROBES: &[&str] = &["favicon.ico", "robots.txt"];

/// An output format the renderer can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Svg,
    Png,
    Webp,
    Pdf,
    Plain,
}

impl OutputFormat {
    /// Every format in the fixed enumeration.
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Svg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Pdf,
        OutputFormat::Plain,
    ];

    /// Parse a path token. Matching is exact and case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "pdf" => Some(Self::Pdf),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    /// The token as it appears in the path and in the renderer flag.
    pub fn token(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Pdf => "pdf",
            Self::Plain => "plain",
        }
    }

    /// Command-line flag selecting this format, e.g. `-Tsvg`.
    pub fn renderer_flag(self) -> String {
        format!("-T{}", self.token())
    }

    /// MIME type of the rendered artifact.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml; charset=utf-8",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Pdf => "application/pdf",
            Self::Plain => "text/plain",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Svg => 1,
            Self::Png => 1 << 1,
            Self::Webp => 1 << 2,
            Self::Pdf => 1 << 3,
            Self::Plain => 1 << 4,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The subset of [`OutputFormat`]s the installed renderer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSet(u8);

impl FormatSet {
    /// Every format enabled.
    pub fn all() -> Self {
        Self::from_formats(OutputFormat::ALL)
    }

    /// No format enabled.
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_formats(formats: impl IntoIterator<Item = OutputFormat>) -> Self {
        let mut set = Self::empty();
        for format in formats {
            set.insert(format);
        }
        set
    }

    pub fn insert(&mut self, format: OutputFormat) {
        self.0 |= format.bit();
    }

    pub fn contains(&self, format: OutputFormat) -> bool {
        self.0 & format.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = OutputFormat> + '_ {
        OutputFormat::ALL
            .into_iter()
            .filter(move |format| self.contains(*format))
    }
}

impl Default for FormatSet {
    fn default() -> Self {
        Self::all()
    }
}

/// What a path segment resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The empty root path.
    Home,
    /// A browser probe path, answered with a fixed 404.
    Probe(&'static str),
    /// A rendering request.
    Render(OutputFormat),
}

/// Resolve the segment following the leading slash.
///
/// Known format tokens that the installed renderer cannot produce are
/// reported as [`Error::UnknownFormat`], the same as tokens outside the
/// enumeration.
pub fn resolve(token: &str, enabled: FormatSet) -> Result<Route> {
    if token.is_empty() {
        return Ok(Route::Home);
    }

    if let Some(probe) = RESERVED_PROBES.iter().copied().find(|probe| *probe == token) {
        return Ok(Route::Probe(probe));
    }

    match OutputFormat::from_token(token) {
        Some(format) if enabled.contains(format) => Ok(Route::Render(format)),
        _ => Err(Error::UnknownFormat(token.to_string())),
    }
}
