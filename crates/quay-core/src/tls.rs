//! Negotiated TLS attributes
//!
//! The kernel reports the handshake result with protocol flags that keep the
//! server and client sides of the legacy protocol versions apart, while the
//! combined [`SslProtocols`] values fold both sides into one. The client bits
//! are filled in here so equality against the combined values works.
//!
//! With the `tls` feature a [`HandshakeInfo`] can also be derived from a
//! rustls server connection.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Protocol version flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SslProtocols(pub u32);

impl SslProtocols {
    pub const NONE: Self = Self(0);

    pub const SSL2_SERVER: Self = Self(0x0004);
    pub const SSL2_CLIENT: Self = Self(0x0008);
    pub const SSL2: Self = Self(0x000C);

    pub const SSL3_SERVER: Self = Self(0x0010);
    pub const SSL3_CLIENT: Self = Self(0x0020);
    pub const SSL3: Self = Self(0x0030);

    pub const TLS1_0_SERVER: Self = Self(0x0040);
    pub const TLS1_0_CLIENT: Self = Self(0x0080);
    pub const TLS1_0: Self = Self(0x00C0);

    pub const TLS1_1_SERVER: Self = Self(0x0100);
    pub const TLS1_1_CLIENT: Self = Self(0x0200);
    pub const TLS1_1: Self = Self(0x0300);

    /// One bit for both sides
    pub const TLS1_2: Self = Self(0x0800);
    /// One bit for both sides
    pub const TLS1_3: Self = Self(0x2000);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SslProtocols {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SslProtocols {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SslProtocols {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for SslProtocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SslProtocols({:#06x})", self.0)
    }
}

/// Legacy versions whose server and client bits differ: (server, client)
///
/// TLS 1.2 and TLS 1.3 use one bit for both sides.
const LEGACY_PROTOCOL_PAIRS: [(SslProtocols, SslProtocols); 4] = [
    (SslProtocols::SSL2_SERVER, SslProtocols::SSL2_CLIENT),
    (SslProtocols::SSL3_SERVER, SslProtocols::SSL3_CLIENT),
    (SslProtocols::TLS1_0_SERVER, SslProtocols::TLS1_0_CLIENT),
    (SslProtocols::TLS1_1_SERVER, SslProtocols::TLS1_1_CLIENT),
];

/// Fill in the paired bit of every legacy version that is present
pub fn normalize_protocol(raw: SslProtocols) -> SslProtocols {
    let mut protocol = raw;
    for (server, client) in LEGACY_PROTOCOL_PAIRS {
        let both = server | client;
        if raw.intersects(both) {
            protocol |= both;
        }
    }
    protocol
}

/// Bulk cipher, identified by its CryptoAPI algorithm id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherAlgorithm {
    #[default]
    None,
    Null,
    Des,
    Rc2,
    TripleDes,
    Aes128,
    Aes192,
    Aes256,
    Aes,
    Rc4,
    ChaCha20Poly1305,
    Other(u32),
}

impl CipherAlgorithm {
    pub fn from_raw(id: u32) -> Self {
        match id {
            0 => CipherAlgorithm::None,
            0x6000 => CipherAlgorithm::Null,
            0x6601 => CipherAlgorithm::Des,
            0x6602 => CipherAlgorithm::Rc2,
            0x6603 => CipherAlgorithm::TripleDes,
            0x660E => CipherAlgorithm::Aes128,
            0x660F => CipherAlgorithm::Aes192,
            0x6610 => CipherAlgorithm::Aes256,
            0x6611 => CipherAlgorithm::Aes,
            0x6801 => CipherAlgorithm::Rc4,
            other => CipherAlgorithm::Other(other),
        }
    }
}

/// MAC / PRF hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    None,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Other(u32),
}

impl HashAlgorithm {
    pub fn from_raw(id: u32) -> Self {
        match id {
            0 => HashAlgorithm::None,
            0x8003 => HashAlgorithm::Md5,
            0x8004 => HashAlgorithm::Sha1,
            0x800C => HashAlgorithm::Sha256,
            0x800D => HashAlgorithm::Sha384,
            0x800E => HashAlgorithm::Sha512,
            other => HashAlgorithm::Other(other),
        }
    }
}

/// Key exchange algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExchangeAlgorithm {
    #[default]
    None,
    RsaSign,
    RsaKeyX,
    DiffieHellman,
    EcdhEphemeral,
    Other(u32),
}

impl ExchangeAlgorithm {
    pub fn from_raw(id: u32) -> Self {
        match id {
            0 => ExchangeAlgorithm::None,
            0x2400 => ExchangeAlgorithm::RsaSign,
            0xA400 => ExchangeAlgorithm::RsaKeyX,
            0xAA02 => ExchangeAlgorithm::DiffieHellman,
            0xAE06 => ExchangeAlgorithm::EcdhEphemeral,
            other => ExchangeAlgorithm::Other(other),
        }
    }
}

/// Handshake result as reported by the raw request source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandshakeInfo {
    pub protocol: SslProtocols,
    pub cipher: CipherAlgorithm,
    pub cipher_strength: u32,
    pub hash: HashAlgorithm,
    pub hash_strength: u32,
    pub key_exchange: ExchangeAlgorithm,
    pub key_exchange_strength: u32,
}

/// TLS attributes exposed on a request; all default on plain HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsAttributes {
    pub protocol: SslProtocols,
    pub cipher: CipherAlgorithm,
    pub cipher_strength: u32,
    pub hash: HashAlgorithm,
    pub hash_strength: u32,
    pub key_exchange: ExchangeAlgorithm,
    pub key_exchange_strength: u32,
}

impl TlsAttributes {
    /// Capture a handshake result, repairing the legacy protocol bits
    pub fn capture(handshake: &HandshakeInfo) -> Self {
        Self {
            protocol: normalize_protocol(handshake.protocol),
            cipher: handshake.cipher,
            cipher_strength: handshake.cipher_strength,
            hash: handshake.hash,
            hash_strength: handshake.hash_strength,
            key_exchange: handshake.key_exchange,
            key_exchange_strength: handshake.key_exchange_strength,
        }
    }
}

#[cfg(feature = "tls")]
mod rustls_handshake {
    use super::*;
    use rustls::{CipherSuite, ProtocolVersion};

    /// Protocol flag for a rustls protocol version (server side for legacy versions)
    pub fn protocol_from_rustls(version: ProtocolVersion) -> SslProtocols {
        match version {
            ProtocolVersion::SSLv2 => SslProtocols::SSL2_SERVER,
            ProtocolVersion::SSLv3 => SslProtocols::SSL3_SERVER,
            ProtocolVersion::TLSv1_0 => SslProtocols::TLS1_0_SERVER,
            ProtocolVersion::TLSv1_1 => SslProtocols::TLS1_1_SERVER,
            ProtocolVersion::TLSv1_2 => SslProtocols::TLS1_2,
            ProtocolVersion::TLSv1_3 => SslProtocols::TLS1_3,
            _ => SslProtocols::NONE,
        }
    }

    /// Cipher, hash and key exchange parameters of a cipher suite rustls can negotiate
    pub fn suite_parameters(suite: CipherSuite) -> HandshakeInfo {
        let (cipher, cipher_strength) = match suite {
            CipherSuite::TLS13_AES_128_GCM_SHA256
            | CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
            | CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => (CipherAlgorithm::Aes128, 128),
            CipherSuite::TLS13_AES_256_GCM_SHA384
            | CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
            | CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => (CipherAlgorithm::Aes256, 256),
            CipherSuite::TLS13_CHACHA20_POLY1305_SHA256
            | CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
            | CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 => {
                (CipherAlgorithm::ChaCha20Poly1305, 256)
            }
            _ => (CipherAlgorithm::None, 0),
        };

        let (hash, hash_strength) = match suite {
            CipherSuite::TLS13_AES_256_GCM_SHA384
            | CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
            | CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => (HashAlgorithm::Sha384, 384),
            _ if cipher != CipherAlgorithm::None => (HashAlgorithm::Sha256, 256),
            _ => (HashAlgorithm::None, 0),
        };

        // Every suite rustls offers uses an ephemeral (EC)DH exchange
        let (key_exchange, key_exchange_strength) = if cipher != CipherAlgorithm::None {
            (ExchangeAlgorithm::EcdhEphemeral, 256)
        } else {
            (ExchangeAlgorithm::None, 0)
        };

        HandshakeInfo {
            protocol: SslProtocols::NONE,
            cipher,
            cipher_strength,
            hash,
            hash_strength,
            key_exchange,
            key_exchange_strength,
        }
    }

    impl HandshakeInfo {
        /// Read the negotiated parameters of a rustls server connection
        pub fn from_rustls(conn: &rustls::ServerConnection) -> Self {
            let mut info = conn
                .negotiated_cipher_suite()
                .map(|suite| suite_parameters(suite.suite()))
                .unwrap_or_default();
            info.protocol = conn
                .protocol_version()
                .map_or(SslProtocols::NONE, protocol_from_rustls);
            info
        }
    }
}

#[cfg(feature = "tls")]
pub use rustls_handshake::{protocol_from_rustls, suite_parameters};
