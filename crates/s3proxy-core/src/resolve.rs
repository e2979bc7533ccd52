//! Request path resolution.
//!
//! Turns a raw request path into a store key and a request kind:
//!
//! 1. strip the configured path prefix;
//! 2. recognise the configured health-check path;
//! 3. follow a `symlink.json` marker, at most once;
//! 4. paths ending in `/` become listings, or index-document lookups when
//!    listings are disabled;
//! 5. everything else is an object lookup.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::HttpOptions;
use crate::error::{ErrorKind, ProxyError, ProxyResult};
use crate::store::ObjectStore;

/// Path segment that marks a symlink document.
pub const SYMLINK_MARKER: &str = "symlink.json";

/// A symlink document stored at a `symlink.json` key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SymlinkDocument {
    /// Path that replaces everything up to and including the marker.
    #[serde(rename = "URL")]
    pub url: String,
}

/// What a resolved request asks the store for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A single object.
    Object,
    /// A directory listing.
    Listing,
}

/// A resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// The working path after stripping and symlink resolution.
    pub path: String,
    /// Store key (or listing prefix).
    pub key: String,
    /// Object or listing.
    pub kind: RequestKind,
}

/// Outcome of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The path is the configured health-check path.
    HealthCheck,
    /// The path maps onto the store.
    Target(ResolvedTarget),
}

/// Resolves request paths against the configured [`HttpOptions`].
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    options: &'a HttpOptions,
}

impl<'a> PathResolver<'a> {
    /// Create a resolver.
    #[must_use]
    pub fn new(options: &'a HttpOptions) -> Self {
        Self { options }
    }

    /// Remove the configured strip prefix, if present.
    #[must_use]
    pub fn strip<'p>(&self, path: &'p str) -> &'p str {
        if self.options.strip_path.is_empty() {
            return path;
        }
        path.strip_prefix(self.options.strip_path.as_str())
            .unwrap_or(path)
    }

    /// Whether `path` (already stripped) is the configured health-check path.
    #[must_use]
    pub fn is_health_check(&self, path: &str) -> bool {
        !self.options.health_check_path.is_empty() && path == self.options.health_check_path
    }

    /// Store key for a working path: the key prefix followed by the path,
    /// without a leading `/`.
    #[must_use]
    pub fn store_key(&self, path: &str) -> String {
        let key = format!("{}{path}", self.options.key_prefix);
        match key.strip_prefix('/') {
            Some(rest) => rest.to_owned(),
            None => key,
        }
    }

    /// Resolve a raw request path.
    ///
    /// Symlink documents are read from `symlinks` (the primary store).
    pub async fn resolve(&self, raw_path: &str, symlinks: &dyn ObjectStore) -> ProxyResult<Resolution> {
        let path = self.strip(raw_path);
        if self.is_health_check(path) {
            return Ok(Resolution::HealthCheck);
        }

        let path = match path.find(SYMLINK_MARKER) {
            Some(idx) => self.follow_symlink(path, idx, symlinks).await?,
            None => path.to_owned(),
        };

        Ok(Resolution::Target(self.classify(path)))
    }

    /// Replace `path[..idx + marker]` with the target of the symlink document
    /// found there. The rewritten path is never resolved again.
    async fn follow_symlink(
        &self,
        path: &str,
        idx: usize,
        store: &dyn ObjectStore,
    ) -> ProxyResult<String> {
        let (link, suffix) = path.split_at(idx + SYMLINK_MARKER.len());
        let key = self.store_key(link);

        let doc = read_symlink(store, &key).await.inspect_err(|err| {
            warn!(key = %key, status = err.status_code().as_u16(), error = %err, "failed to resolve symlink");
        })?;

        let resolved = format!("{}{suffix}", doc.url);
        if resolved.contains(SYMLINK_MARKER) {
            warn!(key = %key, target = %resolved, "symlink target contains another symlink");
            return Err(ProxyError::new(
                ErrorKind::UpstreamFault,
                format!("symlink {key} points at another symlink: {resolved}"),
            ));
        }

        debug!(key = %key, from = path, to = %resolved, "resolved symlink");
        Ok(resolved)
    }

    fn classify(&self, mut path: String) -> ResolvedTarget {
        let kind = if path.ends_with('/') {
            if self.options.directory_listing {
                RequestKind::Listing
            } else {
                path.push_str(&self.options.index_document);
                RequestKind::Object
            }
        } else {
            RequestKind::Object
        };

        ResolvedTarget {
            key: self.store_key(&path),
            path,
            kind,
        }
    }
}

/// Fetch and parse a symlink document.
async fn read_symlink(store: &dyn ObjectStore, key: &str) -> ProxyResult<SymlinkDocument> {
    let obj = store.get(key, None).await?;
    let data = obj.body.collect().await.map_err(|e| {
        ProxyError::internal(format!("failed to read symlink {key}: {e}")).with_source(e)
    })?;

    let doc: SymlinkDocument = serde_json::from_slice(&data).map_err(|e| {
        ProxyError::internal(format!("malformed symlink document {key}: {e}")).with_source(e)
    })?;

    if doc.url.is_empty() {
        return Err(ProxyError::internal(format!(
            "malformed symlink document {key}: empty URL"
        )));
    }
    Ok(doc)
}
