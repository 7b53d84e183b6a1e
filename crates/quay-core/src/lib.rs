//! quay-core: request derivation core
//!
//! Turns a raw, kernel-delivered HTTP request into the [`Request`] the
//! application layer works with: path base and path against the registered
//! URL prefixes, body framing, TLS attributes, the client certificate and a
//! size-limited body stream. Disposal releases every native handle once.
//!
//! ## Features
//! - `tls` - Derive handshake attributes from a rustls server connection

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod body;
pub mod certificate;
pub mod error;
pub mod framing;
pub mod method;
pub mod options;
pub mod path;
pub mod request;
pub mod source;
pub mod tls;

#[cfg(test)]
mod test_support;

// Re-exports
pub use body::Body;
pub use certificate::{ClientCertificate, INITIAL_CERTIFICATE_BUFFER};
pub use error::{Error, Result};
pub use framing::BoundaryType;
pub use method::Method;
pub use options::{RequestOptions, DEFAULT_MAX_CERTIFICATE_ROUNDS, DEFAULT_MAX_REQUEST_BODY_SIZE};
pub use path::{decode_path, resolve_path, PathSplit};
pub use request::Request;
pub use source::{
    BodyTransport, BoxFuture, CertificateReceive, CookedUrl, Identity, RawRequest, RequestChannel,
    SslStatus,
};
pub use tls::{
    normalize_protocol, CipherAlgorithm, ExchangeAlgorithm, HandshakeInfo, HashAlgorithm,
    SslProtocols, TlsAttributes,
};

pub use quay_prefix::{PrefixError, PrefixMatch, UrlPrefix, UrlPrefixes};
