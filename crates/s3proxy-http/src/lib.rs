//! HTTP layer for the s3proxy gateway.
//!
//! - **Service** ([`service`]): [`ProxyHttpService`], the hyper `Service` that
//!   intercepts health checks and metrics scrapes, dispatches GET/HEAD/PUT and
//!   tags every response with a request id and the configured facility.
//!
//! - **Handler** ([`handler`]): [`ProxyHandler`], the object-serving pipeline
//!   (path resolution, listing, dual-store fetch, upload).
//!
//! - **Responses** ([`response`]): store results and errors to HTTP responses.
//!
//! - **Compression** ([`compression`]): gzip responses for clients that accept
//!   it and inflation of gzip uploads.
//!
//! - **Body** ([`body`]): [`ProxyResponseBody`], buffered, streaming or empty.
//!
//! - **Server** ([`server`]): the accept loop with a bounded graceful drain.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> ProxyHttpService (hyper Service)
//!     -> /_health, /metrics, read-through root guard
//!     -> ProxyHandler
//!       -> PathResolver -> listing::render | DualStoreFetcher
//!       -> response translation
//!     -> gzip, X-Request-Id, Facility, access log
//!   <- HTTP Response
//! ```

pub mod body;
pub mod compression;
pub mod handler;
pub mod response;
pub mod server;
pub mod service;

pub use body::ProxyResponseBody;
pub use handler::ProxyHandler;
pub use server::serve;
pub use service::ProxyHttpService;
