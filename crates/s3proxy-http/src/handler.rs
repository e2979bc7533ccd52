//! The object-serving pipeline behind the HTTP service.
//!
//! [`ProxyHandler`] owns the immutable [`HttpOptions`] and the
//! [`DualStoreFetcher`]. GET and HEAD go through path resolution and then
//! either the listing renderer or the fetcher; PUT goes straight to the
//! primary store.

use std::sync::Arc;

use bytes::Bytes;
use s3proxy_core::listing;
use s3proxy_core::{
    DualStoreFetcher, HttpOptions, PathResolver, ProxyError, RequestKind, Resolution,
};
use tracing::{debug, warn};

use crate::response::{
    ProxyResponse, empty_response, error_to_response, into_response, listing_response,
    object_response, put_response,
};

/// Serves GET, HEAD and PUT requests against the configured stores.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    options: Arc<HttpOptions>,
    fetcher: DualStoreFetcher,
}

impl ProxyHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(options: HttpOptions, fetcher: DualStoreFetcher) -> Self {
        Self {
            options: Arc::new(options),
            fetcher,
        }
    }

    /// Path and header options.
    #[must_use]
    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    /// Whether misses read through to a secondary store.
    #[must_use]
    pub fn read_through_enabled(&self) -> bool {
        self.fetcher.read_through_enabled()
    }

    /// Serve a GET (or, with `head`, a HEAD) for the raw request `path`.
    pub async fn get(&self, path: &str, range: Option<&str>, head: bool) -> ProxyResponse {
        let resolver = PathResolver::new(&self.options);
        let target = match resolver.resolve(path, self.fetcher.primary().as_ref()).await {
            Ok(Resolution::HealthCheck) => return empty_response(http::StatusCode::OK),
            Ok(Resolution::Target(target)) => target,
            Err(err) => return failure("resolve", path, &err),
        };

        debug!(path, key = %target.key, kind = ?target.kind, range, "resolved request");

        match target.kind {
            RequestKind::Listing => self.list(&target.key, head).await,
            RequestKind::Object => match self.fetcher.fetch(&target.key, range).await {
                Ok(object) => into_response(object_response(object, &self.options, head)),
                Err(err) => failure("get", &target.key, &err),
            },
        }
    }

    /// Upload `body` to the primary store. No directory or symlink handling.
    pub async fn put(&self, path: &str, body: Bytes, content_type: Option<&str>) -> ProxyResponse {
        let resolver = PathResolver::new(&self.options);
        let key = resolver.store_key(resolver.strip(path));

        match self.fetcher.primary().put(&key, body, content_type).await {
            Ok(output) => {
                debug!(key = %key, e_tag = ?output.e_tag, "stored object");
                into_response(put_response(&output))
            }
            Err(err) => failure("put", &key, &err),
        }
    }

    async fn list(&self, prefix: &str, head: bool) -> ProxyResponse {
        let result = self.fetcher.primary().list(prefix).await.and_then(|output| {
            listing::render(&output, prefix, self.options.listing_format)
        });

        match result {
            Ok((body, content_type)) => into_response(listing_response(body, content_type, head)),
            Err(err) => failure("list", prefix, &err),
        }
    }
}

fn failure(operation: &str, key: &str, err: &ProxyError) -> ProxyResponse {
    let status = err.status_code();
    if status.is_server_error() {
        warn!(operation, key, status = status.as_u16(), code = ?err.code, error = %err, "request failed");
    } else {
        debug!(operation, key, status = status.as_u16(), code = ?err.code, error = %err, "request failed");
    }
    error_to_response(err)
}
