//! quay-prefix: Zero-dependency URL prefix table
//!
//! Registry of the URL prefixes a server listens on. Each registered prefix
//! gets a URL context id; the kernel queue hands that id back with every
//! request so the prefix that matched can be looked up directly.
//!
//! ## Features
//! - Prefix parsing: `http://+:80/app/`, `https://localhost:5001/`, `http://[::1]:8080/api`
//! - O(1) lookup by URL context id
//! - Longest-prefix match for requests that arrive without a usable context
//!   (e.g. transferred between request queues)
//! - Zero external dependencies
//!
//! ## Matching rules
//! 1. Scheme must agree with the connection's secure flag
//! 2. Host and port compare case-insensitively
//! 3. Path compares case-insensitively and only on segment boundaries
//! 4. The longest prefix (shortest remainder) wins
//!
//! ## Example
//! ```
//! use quay_prefix::UrlPrefixes;
//!
//! let mut prefixes = UrlPrefixes::new();
//! prefixes.add_str("http://localhost:80/").unwrap();
//! prefixes.add_str("http://localhost:80/api/").unwrap();
//!
//! let m = prefixes.try_match_longest_prefix(false, "localhost:80", "/API/users").unwrap();
//! assert_eq!(m.path_base, "/API");
//! assert_eq!(m.path, "/users");
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// Prefix parse errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixError {
    /// Scheme is not `http` or `https`
    UnsupportedScheme(String),
    /// Missing `://` delimiter or empty host
    Malformed(String),
    /// Port is not a number in 0..=65535
    InvalidPort(String),
}

impl fmt::Display for PrefixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixError::UnsupportedScheme(s) => write!(f, "Unsupported URL prefix scheme: {}", s),
            PrefixError::Malformed(s) => write!(f, "Malformed URL prefix: {}", s),
            PrefixError::InvalidPort(s) => write!(f, "Invalid URL prefix port: {}", s),
        }
    }
}

impl std::error::Error for PrefixError {}

/// A registered URL prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPrefix {
    scheme: String,
    host: String,
    port: u16,
    path: String,
    host_and_port: String,
    full_prefix: String,
}

impl UrlPrefix {
    /// Build a prefix from its parts
    ///
    /// The path always ends up with a leading and a trailing slash. A missing
    /// port defaults to 80 for `http` and 443 for `https`.
    pub fn create(
        scheme: &str,
        host: &str,
        port: Option<u16>,
        path: &str,
    ) -> Result<Self, PrefixError> {
        let scheme = scheme.to_ascii_lowercase();
        let default_port = match scheme.as_str() {
            "http" => 80,
            "https" => 443,
            _ => return Err(PrefixError::UnsupportedScheme(scheme)),
        };

        if host.is_empty() {
            return Err(PrefixError::Malformed(format!("{}://{}", scheme, path)));
        }

        let port = port.unwrap_or(default_port);

        let mut normalized = String::with_capacity(path.len() + 2);
        if !path.starts_with('/') {
            normalized.push('/');
        }
        normalized.push_str(path);
        if !normalized.ends_with('/') {
            normalized.push('/');
        }

        let host_and_port = format!("{}:{}", host, port);
        let full_prefix = format!("{}://{}{}", scheme, host_and_port, normalized);

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: normalized,
            host_and_port,
            full_prefix,
        })
    }

    /// Parse a prefix string such as `http://+:80/app/`
    ///
    /// # Example
    /// ```
    /// use quay_prefix::UrlPrefix;
    ///
    /// let p = UrlPrefix::parse("https://[::1]:5001/api").unwrap();
    /// assert_eq!(p.host(), "[::1]");
    /// assert_eq!(p.port(), 5001);
    /// assert_eq!(p.path(), "/api/");
    /// assert_eq!(p.path_without_trailing_slash(), "/api");
    /// ```
    pub fn parse(prefix: &str) -> Result<Self, PrefixError> {
        let (scheme, rest) = prefix
            .split_once("://")
            .ok_or_else(|| PrefixError::Malformed(prefix.to_string()))?;

        let path_start = rest.find('/').unwrap_or(rest.len());
        let (authority, path) = rest.split_at(path_start);

        let (host, port) = if authority.starts_with('[') {
            // IPv6 literal: [addr] or [addr]:port
            let close = authority
                .find(']')
                .ok_or_else(|| PrefixError::Malformed(prefix.to_string()))?;
            let host = &authority[..=close];
            let port = authority[close + 1..].strip_prefix(':');
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        let port = match port {
            Some(p) => Some(
                p.parse::<u16>()
                    .map_err(|_| PrefixError::InvalidPort(p.to_string()))?,
            ),
            None => None,
        };

        Self::create(scheme, host, port, path)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path with leading and trailing slash (`/app/`)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path without the trailing slash (`/app`, or empty for the root prefix)
    pub fn path_without_trailing_slash(&self) -> &str {
        &self.path[..self.path.len() - 1]
    }

    /// `host:port`, the form the cooked URL reports
    pub fn host_and_port(&self) -> &str {
        &self.host_and_port
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    pub fn full_prefix(&self) -> &str {
        &self.full_prefix
    }
}

impl fmt::Display for UrlPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_prefix)
    }
}

/// Longest-prefix match result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch {
    /// URL context id of the matched prefix
    pub context: u64,
    /// Matched part of the request path, in the request's casing
    pub path_base: String,
    /// Remainder of the request path
    pub path: String,
}

/// Ordered registry of URL prefixes keyed by URL context id
#[derive(Debug, Default)]
pub struct UrlPrefixes {
    prefixes: BTreeMap<u64, UrlPrefix>,
    next_id: u64,
}

impl UrlPrefixes {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prefix and return its URL context id
    ///
    /// Ids start at 1 and are never reused.
    pub fn add(&mut self, prefix: UrlPrefix) -> u64 {
        self.next_id += 1;
        self.prefixes.insert(self.next_id, prefix);
        self.next_id
    }

    /// Parse and register a prefix
    pub fn add_str(&mut self, prefix: &str) -> Result<u64, PrefixError> {
        Ok(self.add(UrlPrefix::parse(prefix)?))
    }

    /// Remove every registration of `prefix` (case-insensitive); returns true if any was removed
    pub fn remove(&mut self, prefix: &str) -> bool {
        let before = self.prefixes.len();
        self.prefixes
            .retain(|_, p| !p.full_prefix.eq_ignore_ascii_case(prefix));
        self.prefixes.len() != before
    }

    /// Prefix registered under a URL context id
    pub fn get(&self, context: u64) -> Option<&UrlPrefix> {
        self.prefixes.get(&context)
    }

    /// Registered prefixes in registration order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &UrlPrefix)> {
        self.prefixes.iter().map(|(id, p)| (*id, p))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Find the longest registered prefix matching a request
    ///
    /// # Arguments
    /// * `is_https` - Whether the connection is secure
    /// * `host` - `host:port` from the cooked URL
    /// * `path` - Decoded request path
    ///
    /// Wildcard hosts (`+`, `*`) only match a request host spelled the same way.
    pub fn try_match_longest_prefix(
        &self,
        is_https: bool,
        host: &str,
        path: &str,
    ) -> Option<PrefixMatch> {
        let mut best: Option<PrefixMatch> = None;

        for (id, prefix) in &self.prefixes {
            if prefix.is_https() != is_https || !prefix.host_and_port.eq_ignore_ascii_case(host) {
                continue;
            }

            let base = prefix.path_without_trailing_slash();
            let Some(remainder) = strip_segment_prefix(path, base) else {
                continue;
            };

            let longer = best
                .as_ref()
                .map_or(true, |b| remainder.len() < b.path.len());
            if longer {
                best = Some(PrefixMatch {
                    context: *id,
                    // Keep the request's casing
                    path_base: path[..base.len()].to_string(),
                    path: remainder.to_string(),
                });
            }
        }

        best
    }
}

/// Strip `prefix` from `path` if it matches whole segments (ASCII case-insensitive)
fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }

    let head = path.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let rest = &path[prefix.len()..];
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
