//! HTTP Request
//!
//! [`Request`] is built once from a [`RawRequest`]. Everything that lives in
//! the pinned native buffer is copied out in the constructor; the rest is
//! fetched through the [`RequestChannel`] on first use and cached.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{HeaderMap, Version};
use parking_lot::Mutex;
use quay_prefix::UrlPrefixes;

use crate::body::{Body, BodyShared};
use crate::certificate::{CertificateAcquirer, ClientCertificate};
use crate::framing::BoundaryType;
use crate::options::RequestOptions;
use crate::path::{decode_path, resolve_path};
use crate::source::{Identity, RawRequest, RequestChannel, SslStatus};
use crate::tls::TlsAttributes;
use crate::{Error, Method, Result};

/// A request as seen by the application layer
pub struct Request {
    request_id: u64,
    connection_id: u64,
    raw_connection_id: u64,
    known_method: Option<Method>,
    method: String,
    raw_url: String,
    query_string: String,
    path_base: String,
    path: String,
    protocol_version: Version,
    headers: HeaderMap,
    ssl_status: SslStatus,
    tls: TlsAttributes,
    user: Option<Arc<dyn Identity>>,
    channel: Arc<dyn RequestChannel>,
    initial_max_body_size: Option<u64>,
    framing: OnceLock<BoundaryType>,
    certificate: CertificateAcquirer,
    body: Mutex<Option<Arc<BodyShared>>>,
    remote_addr: OnceLock<Option<SocketAddr>>,
    local_addr: OnceLock<Option<SocketAddr>>,
    request_info: OnceLock<HashMap<u32, Bytes>>,
    disposed: AtomicBool,
}

impl Request {
    /// Derive a request from the raw source
    ///
    /// Reads every eager field, then releases the raw view's pins.
    pub fn new<R: RawRequest>(raw: R, prefixes: &UrlPrefixes, options: &RequestOptions) -> Self {
        let request_id = raw.request_id();
        let connection_id = raw.connection_id();
        let raw_connection_id = raw.raw_connection_id();
        let (known_method, method) = raw.verb();

        let raw_url = raw.raw_url().to_string();
        let cooked = raw.cooked_url();
        let original_path = decode_path(raw.raw_url_bytes());
        let ssl_status = raw.ssl_status();
        let split = resolve_path(
            known_method,
            &raw_url,
            &original_path,
            raw.url_context(),
            ssl_status.is_secure(),
            &cooked.host,
            prefixes,
        );

        let protocol_version = raw.version();
        let headers = raw.headers();
        let user = raw.user();
        let tls = if ssl_status.is_secure() {
            TlsAttributes::capture(&raw.tls_handshake())
        } else {
            TlsAttributes::default()
        };

        let channel = raw.release_pins();

        tracing::debug!(
            request_id,
            connection_id,
            raw_connection_id,
            method = %method,
            path_base = %split.path_base,
            path = %split.path,
            "request created"
        );

        Self {
            request_id,
            connection_id,
            raw_connection_id,
            known_method,
            method,
            raw_url,
            query_string: cooked.query.unwrap_or_default(),
            path_base: split.path_base,
            path: split.path,
            protocol_version,
            headers,
            ssl_status,
            tls,
            user,
            channel,
            initial_max_body_size: options.max_request_body_size,
            framing: OnceLock::new(),
            certificate: CertificateAcquirer::new(ssl_status, options.max_certificate_rounds),
            body: Mutex::new(None),
            remote_addr: OnceLock::new(),
            local_addr: OnceLock::new(),
            request_info: OnceLock::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Connection id used for channel calls
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Id of the underlying transport connection
    pub fn raw_connection_id(&self) -> u64 {
        self.raw_connection_id
    }

    /// Known verb, `None` for extension methods
    pub fn known_method(&self) -> Option<Method> {
        self.known_method
    }

    /// Method text as sent by the client
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_head_method(&self) -> bool {
        self.known_method == Some(Method::Head)
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// Part of the path covered by the matched URL prefix
    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string with the leading `?`, or empty
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn protocol_version(&self) -> Version {
        self.protocol_version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn ssl_status(&self) -> SslStatus {
        self.ssl_status
    }

    pub fn is_https(&self) -> bool {
        self.ssl_status.is_secure()
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_https() {
            "https"
        } else {
            "http"
        }
    }

    /// Negotiated TLS parameters; all default on plain HTTP
    pub fn tls(&self) -> &TlsAttributes {
        &self.tls
    }

    pub fn user(&self) -> Option<&Arc<dyn Identity>> {
        self.user.as_ref()
    }

    /// Body framing, classified on first use
    pub fn framing(&self) -> BoundaryType {
        *self
            .framing
            .get_or_init(|| BoundaryType::classify(&self.headers))
    }

    /// Declared body length; `None` unless framed by `Content-Length`
    pub fn content_length(&self) -> Option<u64> {
        self.framing().content_length()
    }

    pub fn has_entity_body(&self) -> bool {
        self.framing().has_entity_body()
    }

    /// Whether the connection can be handed over to an upgraded protocol
    pub fn is_upgradable(&self) -> bool {
        self.protocol_version < Version::HTTP_2 && !self.has_entity_body()
    }

    /// Body stream slot; created on first use if there is a body (or `force`)
    fn ensure_body(&self, force: bool) -> Result<Option<Arc<BodyShared>>> {
        let mut slot = self.body.lock();
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        if slot.is_none() && (force || self.has_entity_body()) {
            *slot = Some(Arc::new(BodyShared::new(
                self.channel.body_transport(),
                self.framing(),
                self.initial_max_body_size,
            )));
        }
        Ok(slot.clone())
    }

    /// Request body; an already-ended stream when the request has none
    ///
    /// After [`dispose`](Self::dispose) this fails with [`Error::Disposed`].
    /// A handle taken earlier behaves differently depending on the request:
    /// a stream-backed handle fails its next read with [`Error::Disposed`],
    /// while the empty handle of a request without a body keeps reporting
    /// end of stream.
    pub fn body(&self) -> Result<Body> {
        Ok(self
            .ensure_body(false)?
            .map_or_else(Body::empty, Body::from_shared))
    }

    /// Current max body size; `None` when unlimited or there is no body
    pub fn max_request_body_size(&self) -> Option<u64> {
        self.ensure_body(false)
            .ok()
            .flatten()
            .and_then(|body| body.max_size())
    }

    /// Change the max body size; ignored when there is no body
    pub fn set_max_request_body_size(&self, size: Option<u64>) -> Result<()> {
        match self.ensure_body(false)? {
            Some(body) => body.set_max_size(size),
            None => Ok(()),
        }
    }

    pub fn has_request_body_started(&self) -> bool {
        self.body
            .lock()
            .as_ref()
            .is_some_and(|body| body.has_started())
    }

    /// Hand the raw connection bytes to the application; cannot be undone
    pub fn switch_to_opaque_mode(&self) -> Result<()> {
        match self.ensure_body(true)? {
            Some(body) => body.switch_to_opaque_mode(),
            None => Err(Error::Disposed),
        }
    }

    /// Client certificate from the handshake, if one was presented
    pub fn client_certificate(&self) -> Option<Arc<ClientCertificate>> {
        self.certificate.load_from_handshake(&*self.channel)
    }

    /// Ask the connection for the client certificate
    ///
    /// Concurrent callers share one retrieval. `cancel` completing before the
    /// certificate arrives fails the call with [`Error::Cancelled`]; a
    /// certificate that was already cached is returned regardless.
    pub async fn client_certificate_async<F>(
        &self,
        cancel: F,
    ) -> Result<Option<Arc<ClientCertificate>>>
    where
        F: Future<Output = ()>,
    {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        self.certificate.acquire(&*self.channel, cancel).await
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        *self.remote_addr.get_or_init(|| self.channel.remote_addr())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.get_or_init(|| self.channel.local_addr())
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_addr().map(|addr| addr.ip())
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.remote_addr().map(|addr| addr.port())
    }

    pub fn local_ip(&self) -> Option<IpAddr> {
        self.local_addr().map(|addr| addr.ip())
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    /// Extra request info keyed by info type
    pub fn request_info(&self) -> &HashMap<u32, Bytes> {
        self.request_info
            .get_or_init(|| self.channel.request_info())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release the channel, the identity and the body stream
    ///
    /// Runs once; later calls return `Ok(())`. Every step runs even if an
    /// earlier one fails, and the first failure is returned.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let body = self.body.lock().take();
        let steps = [
            ("channel", self.channel.close()),
            (
                "user",
                self.user.as_ref().map_or(Ok(()), |user| user.release()),
            ),
            (
                "body",
                body.map_or(Ok(()), |body| {
                    body.release();
                    Ok(())
                }),
            ),
        ];

        let mut first_error = None;
        for (step, result) in steps {
            if let Err(e) = result {
                tracing::debug!(request_id = self.request_id, step, error = %e, "failed to release request resource");
                first_error.get_or_insert(e);
            }
        }

        tracing::trace!(request_id = self.request_id, "request disposed");
        match first_error {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path_base", &self.path_base)
            .field("path", &self.path)
            .field("protocol_version", &self.protocol_version)
            .field("ssl_status", &self.ssl_status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        test_certificate_der, FakeChannel, FakeIdentity, FakeRaw, TEST_CERTIFICATE_FINGERPRINT,
    };
    use crate::tls::{CipherAlgorithm, HandshakeInfo, SslProtocols};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn prefixes() -> UrlPrefixes {
        let mut prefixes = UrlPrefixes::new();
        prefixes.add_str("http://localhost:80/base/").unwrap();
        prefixes
    }

    fn build(raw: FakeRaw) -> Request {
        Request::new(raw, &prefixes(), &RequestOptions::default())
    }

    fn get(url: &str) -> (Arc<FakeChannel>, FakeRaw) {
        let channel = Arc::new(FakeChannel::new());
        let raw = FakeRaw::new("GET", url, channel.clone());
        (channel, raw)
    }

    #[test]
    fn test_eager_fields() {
        let (_, raw) = get("/base/items?id=4");
        let request = build(raw.header("host", "localhost"));

        assert_eq!(request.request_id(), 7);
        assert_eq!(request.connection_id(), 11);
        assert_eq!(request.raw_connection_id(), 3);
        assert_eq!(request.known_method(), Some(Method::Get));
        assert_eq!(request.method(), "GET");
        assert_eq!(request.raw_url(), "/base/items?id=4");
        assert_eq!(request.path_base(), "/base");
        assert_eq!(request.path(), "/items");
        assert_eq!(request.query_string(), "?id=4");
        assert_eq!(request.header("Host"), Some("localhost"));
        assert_eq!(request.scheme(), "http");
        assert!(!request.is_https());
        assert!(!request.is_head_method());
        assert_eq!(*request.tls(), TlsAttributes::default());
    }

    #[test]
    fn test_no_query_is_empty() {
        let (_, raw) = get("/base/");
        let request = build(raw);
        assert_eq!(request.query_string(), "");
        assert_eq!(request.path(), "/");
    }

    #[test]
    fn test_options_star() {
        let channel = Arc::new(FakeChannel::new());
        let request = build(FakeRaw::new("OPTIONS", "*", channel));
        assert_eq!(request.path_base(), "");
        assert_eq!(request.path(), "");
    }

    #[test]
    fn test_extension_method() {
        let channel = Arc::new(FakeChannel::new());
        let request = build(FakeRaw::new("PATCH", "/base/", channel));
        assert_eq!(request.known_method(), None);
        assert_eq!(request.method(), "PATCH");
    }

    #[test]
    fn test_tls_captured_when_secure() {
        let handshake = HandshakeInfo {
            protocol: SslProtocols::TLS1_0_SERVER,
            cipher: CipherAlgorithm::Aes256,
            cipher_strength: 256,
            ..Default::default()
        };
        let (_, raw) = get("/base/");
        let request = build(raw.secure(SslStatus::NoClientCert, handshake));

        assert!(request.is_https());
        assert_eq!(request.scheme(), "https");
        assert_eq!(request.tls().protocol, SslProtocols::TLS1_0);
        assert_eq!(request.tls().cipher, CipherAlgorithm::Aes256);
        assert_eq!(request.tls().cipher_strength, 256);
    }

    #[test]
    fn test_tls_ignored_when_insecure() {
        let handshake = HandshakeInfo {
            protocol: SslProtocols::TLS1_2,
            ..Default::default()
        };
        let (_, raw) = get("/base/");
        let request = build(raw.secure(SslStatus::Insecure, handshake));
        assert_eq!(request.tls().protocol, SslProtocols::NONE);
    }

    #[test]
    fn test_framing() {
        let (_, raw) = get("/base/");
        let request = build(
            raw.header("transfer-encoding", "chunked")
                .header("content-length", "10"),
        );
        assert_eq!(request.framing(), BoundaryType::Chunked);
        assert!(request.has_entity_body());
        assert_eq!(request.content_length(), None);

        let (_, raw) = get("/base/");
        let request = build(raw.header("content-length", "0"));
        assert_eq!(request.content_length(), Some(0));
        assert!(!request.has_entity_body());

        let (_, raw) = get("/base/");
        let request = build(raw);
        assert_eq!(request.framing(), BoundaryType::Invalid);
        assert!(!request.has_entity_body());
    }

    #[test]
    fn test_is_upgradable() {
        let (_, raw) = get("/base/");
        assert!(build(raw).is_upgradable());

        let (_, raw) = get("/base/");
        assert!(!build(raw.header("content-length", "3")).is_upgradable());

        let (_, mut raw) = get("/base/");
        raw.version = Version::HTTP_2;
        assert!(!build(raw).is_upgradable());
    }

    #[tokio::test]
    async fn test_body_with_content_length() {
        let channel = Arc::new(FakeChannel::new().body(b"hello world"));
        let raw = FakeRaw::new("POST", "/base/", channel.clone()).header("content-length", "5");
        let request = build(raw);

        assert!(!request.has_request_body_started());
        let mut body = request.body().unwrap();
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
        assert!(request.has_request_body_started());

        // The stream is created once
        request.body().unwrap();
        assert_eq!(channel.body_opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_body_is_empty_stream() {
        let channel = Arc::new(FakeChannel::new().body(b"ignored"));
        let request = build(FakeRaw::new("GET", "/base/", channel.clone()));

        let mut body = request.body().unwrap();
        let mut out = Vec::new();
        assert_eq!(body.read_to_end(&mut out).await.unwrap(), 0);
        assert!(body.is_empty_body());
        assert_eq!(request.max_request_body_size(), None);
        request.set_max_request_body_size(Some(1)).unwrap();
        assert_eq!(channel.body_opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_max_request_body_size() {
        let channel = Arc::new(FakeChannel::new().body(b"abcdefghij"));
        let raw = FakeRaw::new("POST", "/base/", channel).header("transfer-encoding", "chunked");
        let request = build(raw);
        assert_eq!(request.max_request_body_size(), Some(30_000_000));

        request.set_max_request_body_size(Some(4)).unwrap();
        let mut body = request.body().unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(body.read(&mut buf).await.unwrap(), 3);

        assert!(matches!(
            request.set_max_request_body_size(Some(2)),
            Err(Error::MaxSizeBelowConsumed { .. })
        ));
        assert_eq!(request.max_request_body_size(), Some(4));

        request.set_max_request_body_size(Some(5)).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(body.read(&mut buf).await.unwrap(), 2);
        let err = body.read(&mut buf).await.unwrap_err();
        assert!(matches!(Error::from_io(err), Error::BodyTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_options_set_initial_max() {
        let channel = Arc::new(FakeChannel::new().body(b"abc"));
        let raw = FakeRaw::new("POST", "/base/", channel).header("content-length", "3");
        let options = RequestOptions::new().max_request_body_size(None);
        let request = Request::new(raw, &prefixes(), &options);
        assert_eq!(request.max_request_body_size(), None);
    }

    #[tokio::test]
    async fn test_opaque_mode_without_body() {
        let channel = Arc::new(FakeChannel::new().body(b"websocket frames"));
        let request = build(FakeRaw::new("GET", "/base/ws", channel.clone()));
        assert!(request.is_upgradable());

        request.switch_to_opaque_mode().unwrap();
        assert!(request.has_request_body_started());
        assert_eq!(request.max_request_body_size(), None);

        let mut body = request.body().unwrap();
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"websocket frames");
        assert_eq!(channel.body_opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_client_certificate_from_handshake() {
        let channel = Arc::new(FakeChannel::new().eager_certificate(Ok(Some(test_certificate_der()))));
        let raw = FakeRaw::new("GET", "/base/", channel)
            .secure(SslStatus::ClientCert, HandshakeInfo::default());
        let request = build(raw);

        let cert = request.client_certificate().unwrap();
        assert_eq!(cert.fingerprint_hex(), TEST_CERTIFICATE_FINGERPRINT);
    }

    #[test]
    fn test_client_certificate_malformed_is_none() {
        let channel = Arc::new(FakeChannel::new().eager_certificate(Ok(Some(vec![0x30, 0x03, 0x01]))));
        let raw = FakeRaw::new("GET", "/base/", channel)
            .secure(SslStatus::ClientCert, HandshakeInfo::default());
        assert!(build(raw).client_certificate().is_none());
    }

    #[tokio::test]
    async fn test_client_certificate_async_after_eager() {
        let channel = Arc::new(
            FakeChannel::new()
                .eager_certificate(Ok(Some(test_certificate_der())))
                .certificate(test_certificate_der()),
        );
        let raw = FakeRaw::new("GET", "/base/", channel.clone())
            .secure(SslStatus::ClientCert, HandshakeInfo::default());
        let request = build(raw);

        let eager = request.client_certificate().unwrap();
        let lazy = request
            .client_certificate_async(std::future::pending())
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&eager, &lazy));
        assert_eq!(channel.receive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_insecure_acquire() {
        let channel = Arc::new(FakeChannel::new().certificate(test_certificate_der()));
        let request = Arc::new(build(FakeRaw::new("GET", "/base/", channel.clone())));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let request = request.clone();
                tokio::spawn(async move {
                    request
                        .client_certificate_async(std::future::pending())
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_none());
        }
        assert_eq!(channel.receive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_secure_acquire_converges() {
        let channel = Arc::new(
            FakeChannel::new()
                .certificate(test_certificate_der())
                .receive_delay(Duration::from_millis(20)),
        );
        let raw = FakeRaw::new("GET", "/base/", channel.clone())
            .secure(SslStatus::NoClientCert, HandshakeInfo::default());
        let request = Arc::new(build(raw));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let request = request.clone();
                tokio::spawn(async move {
                    request
                        .client_certificate_async(std::future::pending())
                        .await
                })
            })
            .collect();

        for task in tasks {
            let cert = task.await.unwrap().unwrap().unwrap();
            assert_eq!(cert.fingerprint_hex(), TEST_CERTIFICATE_FINGERPRINT);
        }
        assert_eq!(channel.receive_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_certificate_async_cancelled() {
        let channel = Arc::new(
            FakeChannel::new()
                .certificate(test_certificate_der())
                .receive_delay(Duration::from_secs(60)),
        );
        let raw = FakeRaw::new("GET", "/base/", channel)
            .secure(SslStatus::NoClientCert, HandshakeInfo::default());
        let request = build(raw);

        let err = request
            .client_certificate_async(tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_endpoints_are_cached() {
        let remote: SocketAddr = "10.0.0.1:51000".parse().unwrap();
        let local: SocketAddr = "[::1]:443".parse().unwrap();
        let channel = Arc::new(FakeChannel::new().endpoints(remote, local));
        let request = build(FakeRaw::new("GET", "/base/", channel.clone()));

        assert_eq!(request.remote_addr(), Some(remote));
        assert_eq!(request.remote_ip(), Some(remote.ip()));
        assert_eq!(request.remote_port(), Some(51000));
        assert_eq!(request.local_ip(), Some(local.ip()));
        assert_eq!(request.local_port(), Some(443));
        assert_eq!(channel.remote_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_info_is_cached() {
        let channel = Arc::new(FakeChannel::new().info(2, b"auth"));
        let request = build(FakeRaw::new("GET", "/base/", channel.clone()));

        assert_eq!(request.request_info().get(&2).map(|b| &b[..]), Some(&b"auth"[..]));
        assert_eq!(request.request_info().len(), 1);
        assert_eq!(channel.info_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_twice() {
        let identity = Arc::new(FakeIdentity::default());
        let (channel, mut raw) = get("/base/");
        raw.user = Some(identity.clone());
        let request = build(raw);
        assert_eq!(request.user().and_then(|u| u.name()).as_deref(), Some("CONTOSO\\alice"));

        request.dispose().unwrap();
        request.dispose().unwrap();
        assert!(request.is_disposed());
        drop(request);

        assert_eq!(channel.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(identity.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_dispose_releases_once() {
        let identity = Arc::new(FakeIdentity::default());
        let (channel, mut raw) = get("/base/");
        raw.user = Some(identity.clone());
        let request = Arc::new(build(raw));
        let start = Arc::new(std::sync::Barrier::new(16));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let request = request.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    request.dispose()
                })
            })
            .collect();

        for thread in threads {
            assert!(thread.join().unwrap().is_ok());
        }
        assert!(request.is_disposed());
        drop(request);

        assert_eq!(channel.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(identity.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_body_after_dispose_reports_end() {
        let (_, raw) = get("/base/");
        let request = build(raw);

        let mut body = request.body().unwrap();
        assert!(body.is_empty_body());
        request.dispose().unwrap();

        let mut out = Vec::new();
        assert_eq!(body.read_to_end(&mut out).await.unwrap(), 0);
        assert!(matches!(request.body(), Err(Error::Disposed)));
    }

    #[test]
    fn test_drop_disposes() {
        let (channel, raw) = get("/base/");
        drop(build(raw));
        assert_eq!(channel.close_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_runs_every_step() {
        let identity = Arc::new(FakeIdentity::default());
        let channel = Arc::new(FakeChannel::new().close_error());
        let mut raw = FakeRaw::new("GET", "/base/", channel.clone());
        raw.user = Some(identity.clone());
        let request = build(raw);

        assert!(matches!(request.dispose(), Err(Error::Io(_))));
        assert_eq!(identity.releases.load(Ordering::SeqCst), 1);
        assert!(request.dispose().is_ok());
    }

    #[tokio::test]
    async fn test_body_after_dispose() {
        let channel = Arc::new(FakeChannel::new().body(b"abc"));
        let raw = FakeRaw::new("POST", "/base/", channel).header("content-length", "3");
        let request = build(raw);

        let mut body = request.body().unwrap();
        request.dispose().unwrap();

        let mut buf = [0u8; 3];
        let err = body.read(&mut buf).await.unwrap_err();
        assert!(matches!(Error::from_io(err), Error::Disposed));
        assert!(matches!(request.body(), Err(Error::Disposed)));
        assert!(matches!(request.switch_to_opaque_mode(), Err(Error::Disposed)));
        assert!(matches!(
            request.client_certificate_async(std::future::pending()).await,
            Err(Error::Disposed)
        ));
    }
}
