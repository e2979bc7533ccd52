//! Response body types supporting buffered, streaming and empty modes.
//!
//! - **Buffered**: listings, error messages, metrics.
//! - **Streaming**: object bodies, forwarded chunk by chunk as the store
//!   delivers them.
//! - **Empty**: health checks, HEAD responses, PUT acknowledgements.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body_util::Full;
use s3proxy_core::store::BodyStream;

/// Proxy response body.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper responses.
#[derive(Default)]
pub enum ProxyResponseBody {
    /// Buffered body for small responses.
    Buffered(Full<Bytes>),
    /// Object body streamed from the store. Dropping it releases the store
    /// connection.
    Streaming(BodyStream),
    /// No body.
    #[default]
    Empty,
}

impl ProxyResponseBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create a streaming body.
    #[must_use]
    pub fn from_stream(stream: BodyStream) -> Self {
        Self::Streaming(stream)
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl fmt::Debug for ProxyResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(full) => f.debug_tuple("Buffered").field(full).finish(),
            Self::Streaming(_) => f.write_str("Streaming"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl http_body::Body for ProxyResponseBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(stream) => stream
                .as_mut()
                .poll_next(cx)
                .map(|chunk| chunk.map(|res| res.map(http_body::Frame::data))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(_) => false,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(_) => http_body::SizeHint::default(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}
