//! Request processing options

use crate::{Error, Result};

/// Default max request body size (30,000,000 bytes, ~28.6MB)
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: u64 = 30_000_000;

/// Default number of client certificate receive rounds
pub const DEFAULT_MAX_CERTIFICATE_ROUNDS: usize = 4;

const MAX_REQUEST_BODY_SIZE_ENV: &str = "QUAY_MAX_REQUEST_BODY_SIZE";
const MAX_CERTIFICATE_ROUNDS_ENV: &str = "QUAY_MAX_CERTIFICATE_ROUNDS";

/// Options applied to every request built by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Initial max body size for each request; `None` disables the limit
    pub max_request_body_size: Option<u64>,
    /// How many receive rounds a client certificate may take
    pub max_certificate_rounds: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_request_body_size: Some(DEFAULT_MAX_REQUEST_BODY_SIZE),
            max_certificate_rounds: DEFAULT_MAX_CERTIFICATE_ROUNDS,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the max body size; `None` disables the limit
    pub fn max_request_body_size(mut self, size: Option<u64>) -> Self {
        self.max_request_body_size = size;
        self
    }

    pub fn max_certificate_rounds(mut self, rounds: usize) -> Self {
        self.max_certificate_rounds = rounds.max(1);
        self
    }

    /// Load options from the environment, falling back to defaults
    ///
    /// `QUAY_MAX_REQUEST_BODY_SIZE` accepts a size (`"30mb"`, `"512kb"`,
    /// `"1024"`) or `"none"`. `QUAY_MAX_CERTIFICATE_ROUNDS` is a positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();

        if let Some(raw) = lookup(MAX_REQUEST_BODY_SIZE_ENV) {
            options.max_request_body_size = if raw.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_size(&raw).ok_or_else(|| {
                    Error::InvalidOption(format!("{}={}", MAX_REQUEST_BODY_SIZE_ENV, raw))
                })?)
            };
        }

        if let Some(raw) = lookup(MAX_CERTIFICATE_ROUNDS_ENV) {
            let rounds = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|r| *r > 0)
                .ok_or_else(|| {
                    Error::InvalidOption(format!("{}={}", MAX_CERTIFICATE_ROUNDS_ENV, raw))
                })?;
            options.max_certificate_rounds = rounds;
        }

        Ok(options)
    }
}

/// Parse size from string (e.g., "10mb", "1gb", "500kb")
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('b') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str.trim().parse().ok()?;
    num.checked_mul(multiplier)
}
