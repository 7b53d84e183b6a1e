//! Client certificate acquisition
//!
//! The certificate is fetched at most once per request and cached. The eager
//! path reads bytes that arrived with the handshake; the async path asks the
//! channel for the certificate, growing the receive buffer when the channel
//! reports that more room is needed.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use rustls_pki_types::CertificateDer;
use sha2::{Digest, Sha256};

use crate::source::{CertificateReceive, RequestChannel, SslStatus};
use crate::{Error, Result};

/// First receive buffer size; large enough for most client certificates
pub const INITIAL_CERTIFICATE_BUFFER: usize = 1500;

/// A client certificate presented on the connection
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    der: CertificateDer<'static>,
    fingerprint: [u8; 32],
}

impl ClientCertificate {
    /// Parse a DER certificate; fails on anything that is not a well-formed X.509 certificate
    pub fn from_der(der: Vec<u8>) -> std::result::Result<Self, webpki::Error> {
        let der = CertificateDer::from(der);
        webpki::EndEntityCert::try_from(&der)?;
        let fingerprint = Sha256::digest(&der[..]).into();
        Ok(Self { der, fingerprint })
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// SHA-256 over the DER bytes
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// Lowercase hex of [`fingerprint`](Self::fingerprint)
    pub fn fingerprint_hex(&self) -> String {
        self.fingerprint.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("len", &self.der.len())
            .field("fingerprint", &self.fingerprint_hex())
            .finish()
    }
}

/// Cached, serialized client certificate retrieval for one request
pub(crate) struct CertificateAcquirer {
    ssl_status: SslStatus,
    max_rounds: usize,
    cached: OnceLock<Arc<ClientCertificate>>,
    fetch: tokio::sync::Mutex<()>,
}

impl CertificateAcquirer {
    pub(crate) fn new(ssl_status: SslStatus, max_rounds: usize) -> Self {
        Self {
            ssl_status,
            max_rounds: max_rounds.max(1),
            cached: OnceLock::new(),
            fetch: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn cached(&self) -> Option<Arc<ClientCertificate>> {
        self.cached.get().cloned()
    }

    /// Read the certificate that came with the handshake, if any
    ///
    /// Access and parse failures are logged and reported as no certificate.
    pub(crate) fn load_from_handshake(
        &self,
        channel: &dyn RequestChannel,
    ) -> Option<Arc<ClientCertificate>> {
        if let Some(cert) = self.cached() {
            return Some(cert);
        }
        if self.ssl_status != SslStatus::ClientCert {
            return None;
        }

        match channel.client_certificate_bytes() {
            Ok(Some(bytes)) => self.store(bytes),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, "An error occurred reading the client certificate");
                None
            }
        }
    }

    /// Acquire the certificate, suspending on the channel if needed
    ///
    /// A certificate cached before the call is returned even if `cancel` has
    /// already completed. Otherwise `cancel` completing first yields
    /// [`Error::Cancelled`] and nothing is cached.
    pub(crate) async fn acquire<F>(
        &self,
        channel: &dyn RequestChannel,
        cancel: F,
    ) -> Result<Option<Arc<ClientCertificate>>>
    where
        F: Future<Output = ()>,
    {
        if !self.ssl_status.is_secure() {
            return Ok(None);
        }
        if let Some(cert) = self.cached() {
            return Ok(Some(cert));
        }

        tokio::select! {
            biased;
            _ = cancel => Err(Error::Cancelled),
            result = self.fetch(channel) => result,
        }
    }

    async fn fetch(&self, channel: &dyn RequestChannel) -> Result<Option<Arc<ClientCertificate>>> {
        let _guard = self.fetch.lock().await;

        // Another caller may have finished while we waited
        if let Some(cert) = self.cached() {
            return Ok(Some(cert));
        }

        match receive(channel, self.max_rounds).await? {
            Some(bytes) => Ok(self.store(bytes)),
            None => Ok(None),
        }
    }

    fn store(&self, bytes: Vec<u8>) -> Option<Arc<ClientCertificate>> {
        match ClientCertificate::from_der(bytes) {
            Ok(cert) => Some(Arc::clone(self.cached.get_or_init(|| Arc::new(cert)))),
            Err(e) => {
                tracing::debug!(error = %e, "An error occurred reading the client certificate");
                None
            }
        }
    }
}

/// Run receive rounds until the channel hands over the certificate or reports none
async fn receive(channel: &dyn RequestChannel, max_rounds: usize) -> Result<Option<Vec<u8>>> {
    let mut buffer_size = INITIAL_CERTIFICATE_BUFFER;

    for round in 1..=max_rounds {
        match channel.receive_client_certificate(buffer_size).await? {
            CertificateReceive::Received(bytes) => return Ok(Some(bytes)),
            CertificateReceive::NoCertificate => return Ok(None),
            CertificateReceive::MoreData { required } => {
                tracing::trace!(round, required, "client certificate needs a larger buffer");
                buffer_size = required.max(buffer_size + 1);
            }
        }
    }

    Err(Error::CertificateNegotiation { rounds: max_rounds })
}
