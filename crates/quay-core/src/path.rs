//! Request path decoding and path-base resolution
//!
//! The raw URL bytes are decoded once, then split into `path_base` (the part
//! covered by the registered URL prefix) and `path` (what the application
//! routes on).

use quay_prefix::UrlPrefixes;

use crate::Method;

/// Result of splitting a decoded path against the prefix table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSplit {
    /// Part of the path matched by the prefix, in the request's casing
    pub path_base: String,
    /// Remainder of the path
    pub path: String,
}

/// Decode the path portion of raw URL bytes
///
/// Accepts origin form (`/a/b?q`) and absolute form (`http://host/a/b`).
/// Percent escapes are decoded exactly once, except `%2F`, which stays
/// escaped so it cannot introduce a segment boundary. Dot segments are
/// removed afterwards. If the decoded bytes are not UTF-8 the undecoded
/// path text is returned instead.
pub fn decode_path(raw_url: &[u8]) -> String {
    let raw_path = path_bytes(raw_url);
    let decoded = remove_dot_segments(&unescape(raw_path));

    match String::from_utf8(decoded) {
        Ok(path) => path,
        Err(_) => String::from_utf8_lossy(&remove_dot_segments(raw_path)).into_owned(),
    }
}

/// Slice out the path, skipping scheme and authority and dropping query/fragment
fn path_bytes(raw_url: &[u8]) -> &[u8] {
    let start = if raw_url.first() == Some(&b'/') {
        0
    } else if let Some(pos) = raw_url.windows(3).position(|w| w == b"://") {
        let authority_start = pos + 3;
        match raw_url[authority_start..].iter().position(|b| *b == b'/') {
            Some(offset) => authority_start + offset,
            None => return b"/",
        }
    } else {
        0
    };

    let rest = &raw_url[start..];
    let end = rest
        .iter()
        .position(|b| *b == b'?' || *b == b'#')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Single-pass percent decoding; `%2F` is left as is
fn unescape(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] == b'%' && i + 2 < input.len() {
            if let (Some(hi), Some(lo)) = (hex_value(input[i + 1]), hex_value(input[i + 2])) {
                let byte = hi << 4 | lo;
                if byte == b'/' {
                    out.extend_from_slice(&input[i..i + 3]);
                } else {
                    out.push(byte);
                }
                i += 3;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }

    out
}

/// Remove `.` and `..` segments from an absolute path
fn remove_dot_segments(path: &[u8]) -> Vec<u8> {
    if !path.starts_with(b"/") || !path.contains(&b'.') {
        return path.to_vec();
    }

    let segments: Vec<&[u8]> = path[1..].split(|b| *b == b'/').collect();
    let last = segments.len() - 1;
    let mut kept: Vec<&[u8]> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            b"." => {
                if i == last {
                    kept.push(b"");
                }
            }
            b".." => {
                kept.pop();
                if i == last {
                    kept.push(b"");
                }
            }
            other => kept.push(other),
        }
    }

    let mut out = Vec::with_capacity(path.len());
    for segment in kept {
        out.push(b'/');
        out.extend_from_slice(segment);
    }
    if out.is_empty() {
        out.push(b'/');
    }
    out
}

/// Split a decoded path into path base and path
///
/// # Arguments
/// * `method` - Known verb, if any
/// * `raw_url` - Raw URL text as received
/// * `original_path` - Decoded path (see [`decode_path`])
/// * `url_context` - URL context id the kernel reported
/// * `is_https` / `host` - Used for the longest-prefix fallback
/// * `prefixes` - Registered prefixes
pub fn resolve_path(
    method: Option<Method>,
    raw_url: &str,
    original_path: &str,
    url_context: u64,
    is_https: bool,
    host: &str,
    prefixes: &UrlPrefixes,
) -> PathSplit {
    // 'OPTIONS * HTTP/1.1'
    if method == Some(Method::Options) && raw_url == "*" {
        return PathSplit::default();
    }

    let unmatched = || PathSplit {
        path_base: String::new(),
        path: original_path.to_string(),
    };

    match prefixes.get(url_context) {
        Some(prefix) => {
            let base_len = prefix.path_without_trailing_slash().len();
            if original_path.len() == base_len {
                // Matched exactly except for the trailing slash
                return PathSplit {
                    path_base: original_path.to_string(),
                    path: String::new(),
                };
            }

            // url: /base/path, prefix: /base/ -> base: /base, path: /path
            // url: /, prefix: / -> base: "", path: /
            match (original_path.get(..base_len), original_path.get(base_len..)) {
                (Some(base), Some(rest)) => PathSplit {
                    path_base: base.to_string(),
                    path: rest.to_string(),
                },
                _ => unmatched(),
            }
        }
        None => {
            // No registration for this context: the request was transferred from another queue
            tracing::trace!(url_context, host, "falling back to longest prefix match");
            match prefixes.try_match_longest_prefix(is_https, host, original_path) {
                Some(m) => PathSplit {
                    path_base: m.path_base,
                    path: m.path,
                },
                None => unmatched(),
            }
        }
    }
}
