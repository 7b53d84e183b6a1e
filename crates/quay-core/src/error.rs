//! Error types for quay-core

use thiserror::Error;

/// Result type alias for quay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for request derivation and request resource handling
///
/// Malformed request data (bad `Content-Length`, undecodable path bytes) is
/// never an error here; it is absorbed into the derived request state.
#[derive(Debug, Error)]
pub enum Error {
    /// Body too large
    #[error("Body too large: {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: u64, limit: u64 },

    /// Max body size lowered below what has already been read
    #[error("Max body size {requested} is below the {consumed} bytes already read")]
    MaxSizeBelowConsumed { requested: u64, consumed: u64 },

    /// Request already disposed
    #[error("Request has been disposed")]
    Disposed,

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Client certificate size negotiation did not settle
    #[error("Client certificate not received after {rounds} rounds")]
    CertificateNegotiation { rounds: usize },

    /// Invalid configuration value
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// IO error from the request channel
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::BodyTooLarge { .. } => std::io::Error::new(std::io::ErrorKind::InvalidData, err),
            Error::Disposed => std::io::Error::new(std::io::ErrorKind::NotConnected, err),
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

impl Error {
    /// Recover a quay error carried inside an `io::Error` (e.g. from a body read)
    pub fn from_io(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }

        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(quay)) => *quay,
            Some(Err(inner)) => Error::Io(std::io::Error::new(kind, inner)),
            None => Error::Io(kind.into()),
        }
    }
}
