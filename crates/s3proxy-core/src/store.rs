//! The object-store capability the proxy depends on.
//!
//! [`ObjectStore`] is deliberately narrow: get, put and list against the one
//! bucket a store instance is bound to. The proxy holds two instances (primary
//! and secondary) behind `Arc<dyn ObjectStore>` and never branches on which one
//! it is talking to.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};

use crate::error::ProxyResult;

/// Boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// An object body that is read at most once.
///
/// Dropping the body releases the underlying connection, so every exit path
/// closes it.
pub struct ObjectBody {
    inner: BodyStream,
}

impl ObjectBody {
    /// Wrap a chunk stream.
    pub fn from_stream(
        stream: impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// A body holding a single buffered chunk.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::from_stream(futures::stream::once(async move { Ok(data) }))
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_stream(futures::stream::empty())
    }

    /// Read the whole body into memory.
    pub async fn collect(mut self) -> Result<Bytes, std::io::Error> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Hand the chunk stream to the caller.
    #[must_use]
    pub fn into_stream(self) -> BodyStream {
        self.inner
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody").finish_non_exhaustive()
    }
}

/// A successfully fetched object.
#[derive(Debug)]
pub struct StoredObject {
    /// Object data.
    pub body: ObjectBody,
    /// Size of the (possibly partial) body in bytes.
    pub content_length: Option<i64>,
    /// `Cache-Control` stored with the object.
    pub cache_control: Option<String>,
    /// `Content-Disposition` stored with the object.
    pub content_disposition: Option<String>,
    /// `Content-Encoding` stored with the object.
    pub content_encoding: Option<String>,
    /// `Content-Language` stored with the object.
    pub content_language: Option<String>,
    /// `Content-Range` of a partial response.
    pub content_range: Option<String>,
    /// `Content-Type` stored with the object.
    pub content_type: Option<String>,
    /// Entity tag.
    pub e_tag: Option<String>,
    /// `Expires` stored with the object, verbatim.
    pub expires: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

impl StoredObject {
    /// An object with the given body and no metadata.
    #[must_use]
    pub fn new(body: ObjectBody) -> Self {
        Self {
            body,
            content_length: None,
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            content_language: None,
            content_range: None,
            content_type: None,
            e_tag: None,
            expires: None,
            last_modified: None,
        }
    }

    /// Whether the store answered with a partial (range) response.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.content_range.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutput {
    /// Entity tag of the stored object.
    pub e_tag: Option<String>,
    /// Version ID, when the bucket is versioned.
    pub version_id: Option<String>,
    /// Upload ID, for stores that upload in parts.
    pub upload_id: Option<String>,
    /// Location of the stored object, when the store reports one.
    pub location: Option<String>,
}

/// An object entry from a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Full key.
    pub key: String,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

/// One level of a `/`-delimited listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOutput {
    /// Full key prefixes of sub-directories.
    pub common_prefixes: Vec<String>,
    /// Objects directly under the prefix.
    pub contents: Vec<ListedObject>,
}

/// The operations the proxy needs from a backing store.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Human-readable identity used in logs (e.g. `s3://bucket`).
    fn name(&self) -> &str;

    /// Fetch an object, passing `range` through verbatim.
    async fn get(&self, key: &str, range: Option<&str>) -> ProxyResult<StoredObject>;

    /// Store an object.
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> ProxyResult<PutOutput>;

    /// List one level under `prefix` using `/` as the delimiter.
    async fn list(&self, prefix: &str) -> ProxyResult<ListOutput>;
}
