//! Query string decoding.
//!
//! A graph description can reach the gateway in four shapes: plain text,
//! percent-encoded text, base64, or gzip wrapped in base64. There is no
//! declared encoding, so each stage is gated on a signature in the input
//! and the stages always run in the same order:
//!
//! 1. undo transport over-escaping (`%2F`, trailing `%3D`)
//! 2. percent-decoding, when the query contains a `%20` token
//! 3. base64, when the whole string matches the strict base64 grammar
//! 4. gzip inflation, when the base64 output starts with the gzip magic
//!
//! Reordering the stages breaks payloads that combine encodings.

use std::borrow::Cow;
use std::io::Read;
use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use flate2::read::MultiGzDecoder;
use regex::bytes::Regex;

use crate::error::{Error, Result, fragment};

/// Default cap on the decoded payload size (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// First bytes of a gzip member with the deflate method.
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Token whose presence marks a query as percent-encoded.
const PERCENT_SPACE: &str = "%20";

/// Standard alphabet, padded, tolerant of non-zero trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// The entire string must be canonical base64; anything else is graph source.
static BASE64_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{3}=|[A-Za-z0-9+/]{2}==)?$")
        .expect("base64 regex should compile")
});

/// A decoding stage that was applied to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Percent,
    Base64,
    Gzip,
}

impl DecodeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::Base64 => "base64",
            Self::Gzip => "gzip",
        }
    }
}

/// A graph description with every transport encoding removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    bytes: Vec<u8>,
    stages: Vec<DecodeStage>,
}

impl DecodedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Stages that ran, in order.
    pub fn stages(&self) -> &[DecodeStage] {
        &self.stages
    }

    /// The payload as text, replacing invalid UTF-8.
    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Turns a raw query string into a [`DecodedPayload`].
#[derive(Debug, Clone, Copy)]
pub struct PayloadDecoder {
    max_bytes: usize,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl PayloadDecoder {
    /// Create a decoder that rejects payloads larger than `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Decode the raw query component (everything after `?`).
    pub fn decode(&self, raw_query: &str) -> Result<DecodedPayload> {
        let mut stages = Vec::new();

        let normalized = undo_over_escaping(raw_query);
        if normalized.is_empty() {
            return Err(Error::EmptyPayload);
        }

        let text: Cow<'_, [u8]> = if normalized.contains(PERCENT_SPACE) {
            stages.push(DecodeStage::Percent);
            Cow::Owned(percent_decode(&normalized)?)
        } else {
            match normalized {
                Cow::Borrowed(raw) => Cow::Borrowed(raw.as_bytes()),
                Cow::Owned(raw) => Cow::Owned(raw.into_bytes()),
            }
        };

        let bytes = if BASE64_PATTERN.is_match(&text) {
            stages.push(DecodeStage::Base64);
            let decoded = LENIENT_BASE64
                .decode(&text)
                .map_err(|e| Error::InvalidBase64 {
                    fragment: fragment(&String::from_utf8_lossy(&text)),
                    reason: e.to_string(),
                })?;

            if decoded.starts_with(&GZIP_MAGIC) {
                stages.push(DecodeStage::Gzip);
                self.inflate(&decoded, &text)?
            } else {
                decoded
            }
        } else {
            text.into_owned()
        };

        if bytes.len() > self.max_bytes {
            return Err(Error::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }

        Ok(DecodedPayload { bytes, stages })
    }

    /// Inflate a gzip buffer, reading at most one byte past the cap.
    ///
    /// `encoded` is the base64 text the buffer came from, quoted in errors.
    fn inflate(&self, compressed: &[u8], encoded: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        MultiGzDecoder::new(compressed)
            .take(self.max_bytes as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| Error::InvalidCompression {
                fragment: fragment(&String::from_utf8_lossy(encoded)),
                reason: e.to_string(),
            })?;

        if out.len() > self.max_bytes {
            return Err(Error::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(out)
    }
}

/// Reverse escaping that proxies and clients apply on their own.
///
/// `/` is restored everywhere. `=` is restored only as trailing padding, so a
/// `%3D` inside percent-encoded source still decodes in the percent stage.
fn undo_over_escaping(raw: &str) -> Cow<'_, str> {
    let mut text = if raw.contains("%2F") || raw.contains("%2f") {
        Cow::Owned(raw.replace("%2F", "/").replace("%2f", "/"))
    } else {
        Cow::Borrowed(raw)
    };

    let mut padding = 0;
    let mut trimmed: &str = &text;
    while let Some(rest) = trimmed
        .strip_suffix("%3D")
        .or_else(|| trimmed.strip_suffix("%3d"))
    {
        trimmed = rest;
        padding += 1;
    }

    if padding > 0 {
        let restored = format!("{trimmed}{}", "=".repeat(padding));
        text = Cow::Owned(restored);
    }
    text
}

/// Query-string unescaping: `+` is a space and every `%` must start a
/// two-digit hex escape. Escapes may produce bytes that are not UTF-8.
fn percent_decode(text: &str) -> Result<Vec<u8>> {
    let invalid = |reason: String| Error::InvalidPercentEncoding {
        fragment: fragment(text),
        reason,
    };

    let bytes = text.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }
        let escape = bytes.get(idx + 1..idx + 3);
        let valid = escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            let end = (idx + 3).min(text.len());
            let bad = String::from_utf8_lossy(&bytes[idx..end]);
            return Err(invalid(format!("invalid escape {bad:?} at offset {idx}")));
        }
    }

    let spaced = text.replace('+', " ");
    Ok(urlencoding::decode_binary(spaced.as_bytes()).into_owned())
}
