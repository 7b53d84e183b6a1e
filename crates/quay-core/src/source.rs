//! Raw request source
//!
//! The kernel hands the server a request as a pinned native buffer plus a
//! handle on the connection. That splits into two traits:
//!
//! - [`RawRequest`] is the borrowed view over the pinned buffer. It is only
//!   valid until [`RawRequest::release_pins`] consumes it, so every eager
//!   field is read before that call.
//! - [`RequestChannel`] is what `release_pins` hands back: an independent
//!   path to data that is read later (body bytes, certificate bytes,
//!   endpoints, request info) and the handle that gets closed on disposal.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Version};
use tokio::io::AsyncRead;

use crate::tls::HandshakeInfo;
use crate::Method;

/// Boxed future returned by channel operations that may suspend
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Byte transport beneath a request body
pub type BodyTransport = Box<dyn AsyncRead + Send + Unpin>;

/// TLS state of the connection a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SslStatus {
    /// Plain HTTP
    #[default]
    Insecure,
    /// TLS without a client certificate in the handshake
    NoClientCert,
    /// TLS with a client certificate in the handshake
    ClientCert,
}

impl SslStatus {
    pub fn is_secure(&self) -> bool {
        *self != SslStatus::Insecure
    }
}

/// Host and query parts of the kernel's cooked URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookedUrl {
    /// `host:port` as the client addressed it
    pub host: String,
    /// Query string including the leading `?`, if any
    pub query: Option<String>,
}

/// Opaque authenticated identity attached to a request
pub trait Identity: Send + Sync {
    /// Display name of the principal, if the handle exposes one
    fn name(&self) -> Option<String>;

    /// Release the native token behind this identity
    fn release(&self) -> std::io::Result<()>;
}

/// Answer to one client certificate receive round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateReceive {
    /// Full certificate in DER form
    Received(Vec<u8>),
    /// The client did not present a certificate
    NoCertificate,
    /// Buffer too small; retry with at least `required` bytes
    MoreData { required: usize },
}

/// Borrowed view over a request's pinned native buffer
pub trait RawRequest {
    fn request_id(&self) -> u64;

    /// Connection id used for channel calls (unique per stream on HTTP/2)
    fn connection_id(&self) -> u64;

    /// Id of the underlying transport connection
    fn raw_connection_id(&self) -> u64;

    /// Id of the URL prefix registration that matched
    fn url_context(&self) -> u64;

    /// Known verb, if the kernel recognised it, and the raw method text
    fn verb(&self) -> (Option<Method>, String);

    fn raw_url(&self) -> &str;

    fn raw_url_bytes(&self) -> &[u8];

    fn cooked_url(&self) -> CookedUrl;

    fn headers(&self) -> HeaderMap;

    fn version(&self) -> Version;

    fn ssl_status(&self) -> SslStatus;

    /// Negotiated handshake parameters; only called on secure connections
    fn tls_handshake(&self) -> HandshakeInfo;

    fn user(&self) -> Option<Arc<dyn Identity>> {
        None
    }

    /// Give up access to the pinned buffer
    fn release_pins(self) -> Arc<dyn RequestChannel>;
}

/// Access to a request's connection after the pinned buffer is released
pub trait RequestChannel: Send + Sync {
    /// Open the transport delivering the entity body
    fn body_transport(&self) -> BodyTransport;

    /// Certificate bytes already present in the handshake
    fn client_certificate_bytes(&self) -> std::io::Result<Option<Vec<u8>>>;

    /// One round of receiving the client certificate into a buffer of `buffer_size` bytes
    fn receive_client_certificate(
        &self,
        buffer_size: usize,
    ) -> BoxFuture<'_, std::io::Result<CertificateReceive>>;

    fn remote_addr(&self) -> Option<SocketAddr>;

    fn local_addr(&self) -> Option<SocketAddr>;

    /// Extra request info blobs keyed by info type
    fn request_info(&self) -> HashMap<u32, Bytes> {
        HashMap::new()
    }

    /// Release the native request handle
    fn close(&self) -> std::io::Result<()>;
}
