//! In-memory request source for unit tests

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Version};
use parking_lot::Mutex;

use crate::source::{
    BodyTransport, BoxFuture, CertificateReceive, CookedUrl, Identity, RawRequest, RequestChannel,
    SslStatus,
};
use crate::tls::HandshakeInfo;
use crate::Method;

const TEST_CERTIFICATE_PEM: &[u8] = include_bytes!("../testdata/client.pem");

/// SHA-256 of the DER in `testdata/client.pem`
pub(crate) const TEST_CERTIFICATE_FINGERPRINT: &str =
    "8ff9f55330bd5624761d4dbd6931a5416e40bf2772f64c78465c20c690600e36";

pub(crate) fn test_certificate_der() -> Vec<u8> {
    let cert = rustls_pemfile::certs(&mut &TEST_CERTIFICATE_PEM[..])
        .next()
        .unwrap()
        .unwrap();
    cert.to_vec()
}

#[derive(Default)]
pub(crate) struct FakeChannel {
    body: Vec<u8>,
    eager_certificate: Option<Result<Option<Vec<u8>>, io::ErrorKind>>,
    certificate: Option<Vec<u8>>,
    required_buffer: Option<usize>,
    always_more_data: bool,
    receive_error: Option<io::ErrorKind>,
    receive_delay: Option<Duration>,
    close_error: bool,
    remote: Option<SocketAddr>,
    local: Option<SocketAddr>,
    info: HashMap<u32, Bytes>,
    pub receive_calls: AtomicUsize,
    pub buffer_sizes: Mutex<Vec<usize>>,
    pub body_opens: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub remote_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn eager_certificate(mut self, result: Result<Option<Vec<u8>>, io::ErrorKind>) -> Self {
        self.eager_certificate = Some(result);
        self
    }

    pub fn certificate(mut self, der: Vec<u8>) -> Self {
        self.certificate = Some(der);
        self
    }

    /// Answer `MoreData` until the buffer is at least this large
    pub fn required_buffer(mut self, size: usize) -> Self {
        self.required_buffer = Some(size);
        self
    }

    pub fn always_more_data(mut self) -> Self {
        self.always_more_data = true;
        self
    }

    pub fn receive_error(mut self, kind: io::ErrorKind) -> Self {
        self.receive_error = Some(kind);
        self
    }

    pub fn receive_delay(mut self, delay: Duration) -> Self {
        self.receive_delay = Some(delay);
        self
    }

    pub fn close_error(mut self) -> Self {
        self.close_error = true;
        self
    }

    pub fn endpoints(mut self, remote: SocketAddr, local: SocketAddr) -> Self {
        self.remote = Some(remote);
        self.local = Some(local);
        self
    }

    pub fn info(mut self, key: u32, value: &'static [u8]) -> Self {
        self.info.insert(key, Bytes::from_static(value));
        self
    }
}

impl RequestChannel for FakeChannel {
    fn body_transport(&self) -> BodyTransport {
        self.body_opens.fetch_add(1, Ordering::SeqCst);
        Box::new(io::Cursor::new(self.body.clone()))
    }

    fn client_certificate_bytes(&self) -> io::Result<Option<Vec<u8>>> {
        match &self.eager_certificate {
            None => Ok(None),
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(kind)) => Err(io::Error::new(*kind, "certificate unavailable")),
        }
    }

    fn receive_client_certificate(
        &self,
        buffer_size: usize,
    ) -> BoxFuture<'_, io::Result<CertificateReceive>> {
        Box::pin(async move {
            self.receive_calls.fetch_add(1, Ordering::SeqCst);
            self.buffer_sizes.lock().push(buffer_size);

            if let Some(delay) = self.receive_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(kind) = self.receive_error {
                return Err(io::Error::new(kind, "receive failed"));
            }
            if self.always_more_data {
                return Ok(CertificateReceive::MoreData {
                    required: buffer_size.saturating_add(1),
                });
            }

            Ok(match (&self.certificate, self.required_buffer) {
                (None, _) => CertificateReceive::NoCertificate,
                (Some(_), Some(required)) if buffer_size < required => {
                    CertificateReceive::MoreData { required }
                }
                (Some(der), _) => CertificateReceive::Received(der.clone()),
            })
        })
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        self.remote
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn request_info(&self) -> HashMap<u32, Bytes> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.info.clone()
    }

    fn close(&self) -> io::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.close_error {
            Err(io::Error::new(io::ErrorKind::Other, "close failed"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeIdentity {
    pub releases: AtomicUsize,
}

impl Identity for FakeIdentity {
    fn name(&self) -> Option<String> {
        Some("CONTOSO\\alice".to_string())
    }

    fn release(&self) -> io::Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeRaw {
    pub request_id: u64,
    pub connection_id: u64,
    pub raw_connection_id: u64,
    pub url_context: u64,
    pub method: String,
    pub raw_url: String,
    pub host: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub version: Version,
    pub ssl_status: SslStatus,
    pub handshake: HandshakeInfo,
    pub user: Option<Arc<dyn Identity>>,
    pub channel: Arc<FakeChannel>,
}

impl FakeRaw {
    pub fn new(method: &str, raw_url: &str, channel: Arc<FakeChannel>) -> Self {
        let query = raw_url.find('?').map(|pos| raw_url[pos..].to_string());
        Self {
            request_id: 7,
            connection_id: 11,
            raw_connection_id: 3,
            url_context: 1,
            method: method.to_string(),
            raw_url: raw_url.to_string(),
            host: "localhost:80".to_string(),
            query,
            headers: HeaderMap::new(),
            version: Version::HTTP_11,
            ssl_status: SslStatus::Insecure,
            handshake: HandshakeInfo::default(),
            user: None,
            channel,
        }
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.append(name, HeaderValue::from_static(value));
        self
    }

    pub fn secure(mut self, status: SslStatus, handshake: HandshakeInfo) -> Self {
        self.ssl_status = status;
        self.handshake = handshake;
        self
    }
}

impl RawRequest for FakeRaw {
    fn request_id(&self) -> u64 {
        self.request_id
    }

    fn connection_id(&self) -> u64 {
        self.connection_id
    }

    fn raw_connection_id(&self) -> u64 {
        self.raw_connection_id
    }

    fn url_context(&self) -> u64 {
        self.url_context
    }

    fn verb(&self) -> (Option<Method>, String) {
        (Method::parse(self.method.as_bytes()), self.method.clone())
    }

    fn raw_url(&self) -> &str {
        &self.raw_url
    }

    fn raw_url_bytes(&self) -> &[u8] {
        self.raw_url.as_bytes()
    }

    fn cooked_url(&self) -> CookedUrl {
        CookedUrl {
            host: self.host.clone(),
            query: self.query.clone(),
        }
    }

    fn headers(&self) -> HeaderMap {
        self.headers.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn ssl_status(&self) -> SslStatus {
        self.ssl_status
    }

    fn tls_handshake(&self) -> HandshakeInfo {
        self.handshake
    }

    fn user(&self) -> Option<Arc<dyn Identity>> {
        self.user.clone()
    }

    fn release_pins(self) -> Arc<dyn RequestChannel> {
        self.channel
    }
}
