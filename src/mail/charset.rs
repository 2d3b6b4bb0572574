//! Charset detection for raw message bytes.
//!
//! The archive stores the `.eml` as text, so raw bytes are decoded once with
//! whatever charset the detector reports. When it reports nothing, the fixed
//! legacy single-byte fallback is used, which maps every byte and never fails.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

/// Fallback for bytes nothing could be detected for.
/// `encoding_rs` follows WHATWG, where the `ISO-8859-1` label resolves to windows-1252.
pub const FALLBACK_ENCODING: &Encoding = WINDOWS_1252;

pub trait CharsetDetector: Send + Sync {
    fn detect(&self, raw: &[u8]) -> Option<&'static Encoding>;
}

/// Accepts well-formed UTF-8 outright, otherwise trusts the first `charset=`
/// parameter found in the top-level header block.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDetector;

impl CharsetDetector for HeuristicDetector {
    fn detect(&self, raw: &[u8]) -> Option<&'static Encoding> {
        if std::str::from_utf8(raw).is_ok() {
            return Some(UTF_8);
        }
        declared_charset(header_block(raw))
    }
}

/// Decode `raw` with the detected charset, or the fallback when detection yields none.
pub fn decode_with_fallback(detector: &dyn CharsetDetector, raw: &[u8]) -> String {
    let encoding = detector.detect(raw).unwrap_or(FALLBACK_ENCODING);
    let (text, had_errors) = encoding.decode_without_bom_handling(raw);
    if had_errors {
        tracing::debug!(
            "Decoding with {} replaced malformed sequences",
            encoding.name()
        );
    }
    text.into_owned()
}

fn header_block(raw: &[u8]) -> &[u8] {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .or_else(|| raw.windows(2).position(|w| w == b"\n\n"))
        .unwrap_or(raw.len());
    &raw[..end]
}

fn declared_charset(headers: &[u8]) -> Option<&'static Encoding> {
    const NEEDLE: &[u8] = b"charset=";

    let lower = headers.to_ascii_lowercase();
    let start = lower.windows(NEEDLE.len()).position(|w| w == NEEDLE)? + NEEDLE.len();
    let label: Vec<u8> = lower[start..]
        .iter()
        .copied()
        .skip_while(|b| *b == b'"' || *b == b'\'')
        .take_while(|b| !matches!(b, b'"' | b'\'' | b';' | b' ' | b'\t' | b'\r' | b'\n'))
        .collect();

    Encoding::for_label(&label)
}
