//! Request body stream
//!
//! A [`Body`] is a handle on the request's body state. The request keeps its
//! own handle so it can adjust the size limit, switch to opaque mode and
//! release the transport on disposal while the application is reading.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};

use crate::framing::BoundaryType;
use crate::source::BodyTransport;
use crate::{Error, Result};

/// Readable request body
///
/// Reads fail with [`Error::BodyTooLarge`] (as an `io::Error`, see
/// [`Error::from_io`]) once the configured max size would be exceeded, and
/// with [`Error::Disposed`] after the request has been disposed.
pub struct Body {
    shared: Option<Arc<BodyShared>>,
}

impl Body {
    /// A body with no bytes; reads report end of stream immediately
    pub fn empty() -> Self {
        Self { shared: None }
    }

    pub(crate) fn from_shared(shared: Arc<BodyShared>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    /// Bytes handed out so far
    pub fn bytes_read(&self) -> u64 {
        self.shared.as_ref().map_or(0, |s| s.state.lock().consumed)
    }

    pub fn is_empty_body(&self) -> bool {
        self.shared.is_none()
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body")
            .field("empty", &self.is_empty_body())
            .field("bytes_read", &self.bytes_read())
            .finish()
    }
}

impl AsyncRead for Body {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.shared.as_ref() {
            Some(shared) => shared.state.lock().poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

enum Transport {
    /// Fixed-length body; the transport stops at the declared length
    Framed(Take<BodyTransport>),
    /// Chunked or opaque; read until the transport ends
    Raw(BodyTransport),
}

impl Transport {
    fn new(transport: BodyTransport, framing: BoundaryType) -> Self {
        match framing {
            BoundaryType::ContentLength(length) => Transport::Framed(transport.take(length)),
            _ => Transport::Raw(transport),
        }
    }

    fn into_raw(self) -> BodyTransport {
        match self {
            Transport::Framed(take) => take.into_inner(),
            Transport::Raw(raw) => raw,
        }
    }

    fn poll_read(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self {
            Transport::Framed(take) => Pin::new(take).poll_read(cx, buf),
            Transport::Raw(raw) => Pin::new(raw).poll_read(cx, buf),
        }
    }
}

struct BodyState {
    transport: Option<Transport>,
    framing: BoundaryType,
    max_size: Option<u64>,
    consumed: u64,
    started: bool,
    opaque: bool,
    released: bool,
}

impl BodyState {
    fn limit(&self) -> Option<u64> {
        if self.opaque {
            None
        } else {
            self.max_size
        }
    }

    fn poll_read(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.released {
            return Poll::Ready(Err(Error::Disposed.into()));
        }

        // A declared length over the limit fails before any byte is read
        if !self.started {
            if let (Some(limit), Some(declared)) = (self.limit(), self.framing.content_length()) {
                if declared > limit {
                    return Poll::Ready(Err(Error::BodyTooLarge {
                        size: declared,
                        limit,
                    }
                    .into()));
                }
            }
        }

        let Some(transport) = self.transport.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        let before = buf.filled().len();
        ready!(transport.poll_read(cx, buf))?;
        let read = (buf.filled().len() - before) as u64;
        if read == 0 {
            return Poll::Ready(Ok(()));
        }

        self.started = true;
        let total = self.consumed + read;
        if let Some(limit) = self.limit() {
            if total > limit {
                buf.set_filled(before);
                return Poll::Ready(Err(Error::BodyTooLarge { size: total, limit }.into()));
            }
        }
        self.consumed = total;
        Poll::Ready(Ok(()))
    }
}

/// Body state shared between the request and its [`Body`] handles
pub(crate) struct BodyShared {
    state: Mutex<BodyState>,
}

impl BodyShared {
    pub(crate) fn new(transport: BodyTransport, framing: BoundaryType, max_size: Option<u64>) -> Self {
        Self {
            state: Mutex::new(BodyState {
                transport: Some(Transport::new(transport, framing)),
                framing,
                max_size,
                consumed: 0,
                started: false,
                opaque: false,
                released: false,
            }),
        }
    }

    pub(crate) fn max_size(&self) -> Option<u64> {
        self.state.lock().max_size
    }

    /// Change the max size; it may not drop below what was already read
    pub(crate) fn set_max_size(&self, size: Option<u64>) -> Result<()> {
        let mut state = self.state.lock();
        if state.released {
            return Err(Error::Disposed);
        }
        if let Some(requested) = size {
            if requested < state.consumed {
                return Err(Error::MaxSizeBelowConsumed {
                    requested,
                    consumed: state.consumed,
                });
            }
        }
        state.max_size = size;
        Ok(())
    }

    pub(crate) fn has_started(&self) -> bool {
        self.state.lock().started
    }

    /// Stop interpreting framing and the size limit; cannot be undone
    pub(crate) fn switch_to_opaque_mode(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.released {
            return Err(Error::Disposed);
        }
        if state.opaque {
            return Ok(());
        }

        state.opaque = true;
        state.started = true;
        state.max_size = None;
        state.transport = state
            .transport
            .take()
            .map(|t| Transport::Raw(t.into_raw()));
        Ok(())
    }

    /// Drop the transport; later reads fail with [`Error::Disposed`]
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        state.transport = None;
    }
}
