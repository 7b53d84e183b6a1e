//! Request body framing
//!
//! Decides from the headers alone whether a request carries a body and how
//! its end is found. `Transfer-Encoding: chunked` always wins over
//! `Content-Length`: the kernel adds the chunked header to HTTP/2 requests
//! with bodies, so a length next to it cannot be trusted.

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName};

/// How the end of a request body is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryType {
    /// Body ends when the transport ends
    Chunked,
    /// Body is exactly this many bytes
    ContentLength(u64),
    /// No usable framing header; no body is assumed
    Invalid,
}

impl BoundaryType {
    /// Classify a request from its headers
    pub fn classify(headers: &HeaderMap) -> Self {
        if let Some(te) = joined(headers, &TRANSFER_ENCODING) {
            if te.trim().eq_ignore_ascii_case("chunked") {
                return BoundaryType::Chunked;
            }
        }

        joined(headers, &CONTENT_LENGTH)
            .and_then(|length| parse_content_length(length.trim()))
            .map_or(BoundaryType::Invalid, BoundaryType::ContentLength)
    }

    /// Declared length, only for fixed-length framing
    pub fn content_length(&self) -> Option<u64> {
        match self {
            BoundaryType::ContentLength(n) => Some(*n),
            _ => None,
        }
    }

    /// True for chunked bodies and non-empty fixed-length bodies
    pub fn has_entity_body(&self) -> bool {
        match self {
            BoundaryType::Chunked => true,
            BoundaryType::ContentLength(n) => *n > 0,
            BoundaryType::Invalid => false,
        }
    }
}

/// All values of a header joined with `,`; `None` if absent or not visible ASCII
fn joined(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let mut out: Option<String> = None;
    for value in headers.get_all(name) {
        let value = value.to_str().ok()?;
        match out.as_mut() {
            Some(s) => {
                s.push(',');
                s.push_str(value);
            }
            None => out = Some(value.to_string()),
        }
    }
    out
}

/// Digits only: no sign, no whitespace, no separators; must fit in an i64
fn parse_content_length(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok().map(|n| n as u64)
}
