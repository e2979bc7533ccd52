//! Request resolution and object serving for the s3proxy gateway.
//!
//! This crate holds everything between an incoming path and the object store:
//!
//! - **Configuration** ([`config`]): the immutable [`ProxyConfig`] built once at
//!   startup from `S3_PROXY_*` environment variables.
//! - **Errors** ([`error`]): [`ProxyError`] and the [`ErrorKind`] classifier that
//!   maps object-store failures onto HTTP status codes.
//! - **Stores** ([`store`], [`s3`]): the narrow [`ObjectStore`] capability
//!   (get/put/list) and its `aws-sdk-s3` implementation.
//! - **Path resolution** ([`resolve`]): prefix stripping, one-hop symlink
//!   indirection, directory detection and index-document fallback.
//! - **Fetching** ([`fetch`]): the primary/secondary read-through strategy.
//! - **Listings** ([`listing`]): de-duplicated, sorted directory views rendered
//!   as HTML or JSON.
//! - **Metrics** ([`metrics`]): process-wide counters rendered in Prometheus
//!   text format.
//!
//! # Architecture
//!
//! ```text
//! raw path
//!   -> PathResolver (strip prefix, symlink.json, trailing '/')
//!     -> Listing  -> ObjectStore::list  -> listing::render
//!     -> Object   -> DualStoreFetcher   -> StoredObject
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod listing;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod metrics;
pub mod resolve;
pub mod s3;
pub mod store;

pub use config::{HttpOptions, ListingFormat, ProxyConfig, StoreConfig};
pub use error::{ErrorKind, ProxyError};
pub use fetch::DualStoreFetcher;
pub use metrics::ProxyMetrics;
pub use resolve::{PathResolver, RequestKind, Resolution, ResolvedTarget};
pub use store::{ListOutput, ObjectBody, ObjectStore, PutOutput, StoredObject};
