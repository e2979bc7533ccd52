//! The proxy HTTP service implementing hyper's `Service` trait.
//!
//! [`ProxyHttpService`] handles, in order:
//!
//! 1. The built-in health check (`GET /_health`)
//! 2. The metrics scrape (`GET /metrics`)
//! 3. The bare root when read-through is enabled (404)
//! 4. GET / HEAD / PUT dispatch to the [`ProxyHandler`]
//! 5. 405 for any other method
//! 6. Gzip for clients that accept it (see [`crate::compression`])
//! 7. Common response headers (`X-Request-Id`, `Facility`) and the access log

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::Service;
use percent_encoding::percent_decode_str;
use s3proxy_core::ProxyMetrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::body::ProxyResponseBody;
use crate::compression::{accepts_gzip, decode_request_body, gzip_response};
use crate::handler::ProxyHandler;
use crate::response::{ProxyResponse, empty_response, text_response};

/// Path of the built-in health check.
pub const HEALTH_PATH: &str = "/_health";

/// Path of the Prometheus scrape endpoint.
pub const METRICS_PATH: &str = "/metrics";

/// The proxy HTTP service.
#[derive(Debug, Clone)]
pub struct ProxyHttpService {
    handler: ProxyHandler,
    metrics: Arc<ProxyMetrics>,
}

impl ProxyHttpService {
    /// Create a service.
    #[must_use]
    pub fn new(handler: ProxyHandler, metrics: Arc<ProxyMetrics>) -> Self {
        Self { handler, metrics }
    }

    /// Handle one request, adding common headers and writing the access log.
    pub async fn handle<B>(&self, req: http::Request<B>) -> ProxyResponse
    where
        B: http_body::Body<Data = Bytes> + Send,
        B::Error: Display,
    {
        let request_id = Uuid::new_v4().to_string();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let started = Instant::now();
        let gzip = self.handler.options().compression && accepts_gzip(req.headers());

        let mut response = process_request(req, &self.handler, &self.metrics, &request_id).await;
        if gzip {
            response = gzip_response(response).await;
        }
        let response = add_common_headers(response, &request_id, &self.handler.options().facility);

        let elapsed = started.elapsed();
        self.metrics
            .record_request(method.as_str(), response.status().as_u16(), elapsed);
        info!(
            %method,
            path,
            status = response.status().as_u16(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            request_id,
            "request completed"
        );
        response
    }
}

impl Service<http::Request<Incoming>> for ProxyHttpService {
    type Response = http::Response<ProxyResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

/// Route a request through the proxy pipeline.
async fn process_request<B>(
    req: http::Request<B>,
    handler: &ProxyHandler,
    metrics: &ProxyMetrics,
    request_id: &str,
) -> ProxyResponse
where
    B: http_body::Body<Data = Bytes> + Send,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = decode_path(req.uri().path());
    debug!(%method, path, request_id, "processing request");

    let is_read = method == http::Method::GET || method == http::Method::HEAD;

    // 1. Built-in health check.
    if is_read && path == HEALTH_PATH {
        return empty_response(http::StatusCode::OK);
    }

    // 2. Metrics scrape.
    if method == http::Method::GET && path == METRICS_PATH {
        return prometheus_metrics_response(metrics);
    }

    // 3. The bucket root is never listed when misses read through.
    if path == "/" && handler.read_through_enabled() {
        return empty_response(http::StatusCode::NOT_FOUND);
    }

    // 4. Dispatch.
    match method {
        http::Method::GET | http::Method::HEAD => {
            let range = req
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned);
            handler
                .get(&path, range.as_deref(), method == http::Method::HEAD)
                .await
        }
        http::Method::PUT => {
            let content_type = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned);
            let encoding = req
                .headers()
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned);
            let body = match collect_body(req.into_body()).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(error = %err, request_id, "failed to collect request body");
                    return text_response(http::StatusCode::INTERNAL_SERVER_ERROR, &err);
                }
            };
            let body = if handler.options().compression {
                match decode_request_body(encoding.as_deref(), body) {
                    Ok(body) => body,
                    Err(err) => {
                        warn!(error = %err, request_id, "failed to decode request body");
                        return text_response(http::StatusCode::BAD_REQUEST, &err);
                    }
                }
            } else {
                body
            };
            handler.put(&path, body, content_type.as_deref()).await
        }
        _ => method_not_allowed_response(),
    }
}

/// Percent-decode a request path. Invalid UTF-8 sequences are replaced.
fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Collect the full request body into `Bytes`.
async fn collect_body<B>(body: B) -> Result<Bytes, String>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Display,
{
    body.collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(|e| e.to_string())
}

/// Produce a Prometheus-format metrics response.
fn prometheus_metrics_response(metrics: &ProxyMetrics) -> ProxyResponse {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
        .body(ProxyResponseBody::from_string(metrics.render_prometheus()))
        .expect("static metrics response should be valid")
}

fn method_not_allowed_response() -> ProxyResponse {
    let mut response = text_response(http::StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD, PUT"));
    response
}

/// Add common response headers to every response.
fn add_common_headers(mut response: ProxyResponse, request_id: &str, facility: &str) -> ProxyResponse {
    let headers = response.headers_mut();

    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert("x-request-id", hv);
    }

    if !facility.is_empty() {
        if let Ok(hv) = HeaderValue::from_str(facility) {
            headers.insert("facility", hv);
        }
    }

    response
}
