//! Gzip content coding for responses and request bodies.
//!
//! Responses are compressed when the client lists `gzip` (or `*`) in
//! `Accept-Encoding`. Objects that already carry a `Content-Encoding`, partial
//! content and bodiless responses pass through untouched. Streaming bodies are
//! compressed chunk by chunk so the object is never buffered.
//!
//! Uploads sent with `Content-Encoding: gzip` are inflated before they reach
//! the store.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use futures::StreamExt;
use http::header::{self, HeaderMap, HeaderValue};
use http_body_util::BodyExt;
use s3proxy_core::store::BodyStream;
use tracing::{debug, warn};

use crate::body::ProxyResponseBody;
use crate::response::ProxyResponse;

/// Whether the request's `Accept-Encoding` allows a gzip response.
#[must_use]
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|entry| {
            let mut parts = entry.split(';');
            let coding = parts.next().unwrap_or_default().trim();
            let accepted = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .all(|q| q.trim().parse::<f32>().is_ok_and(|q| q > 0.0));
            accepted && (coding.eq_ignore_ascii_case("gzip") || coding == "*")
        })
}

/// Gzip a response body in place when it is eligible.
pub async fn gzip_response(response: ProxyResponse) -> ProxyResponse {
    if !is_compressible(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let body = match body {
        ProxyResponseBody::Buffered(full) => {
            let data = match full.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            match gzip_bytes(&data) {
                Ok(compressed) => {
                    parts
                        .headers
                        .insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
                    ProxyResponseBody::from_bytes(compressed)
                }
                Err(err) => {
                    warn!(error = %err, "gzip failed, sending identity body");
                    return ProxyResponse::from_parts(parts, ProxyResponseBody::from_bytes(data));
                }
            }
        }
        ProxyResponseBody::Streaming(stream) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            ProxyResponseBody::from_stream(gzip_stream(stream))
        }
        ProxyResponseBody::Empty => return ProxyResponse::from_parts(parts, ProxyResponseBody::Empty),
    };

    parts
        .headers
        .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    parts
        .headers
        .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    debug!(status = parts.status.as_u16(), "gzip response");
    ProxyResponse::from_parts(parts, body)
}

fn is_compressible(response: &ProxyResponse) -> bool {
    let status = response.status();
    let headers = response.headers();
    !matches!(response.body(), ProxyResponseBody::Empty)
        && status != http::StatusCode::PARTIAL_CONTENT
        && status != http::StatusCode::NO_CONTENT
        && status != http::StatusCode::NOT_MODIFIED
        && !headers.contains_key(header::CONTENT_ENCODING)
        && !headers.contains_key(header::CONTENT_RANGE)
}

/// Gzip a buffer in one go.
pub fn gzip_bytes(data: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish().map(Bytes::from)
}

/// Gzip a byte stream, emitting compressed output as it becomes available.
#[must_use]
pub fn gzip_stream(inner: BodyStream) -> BodyStream {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    Box::pin(futures::stream::unfold(
        Some((inner, encoder)),
        |state| async move {
            let (mut inner, mut encoder) = state?;
            loop {
                match inner.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(err) = encoder.write_all(&chunk) {
                            return Some((Err(err), None));
                        }
                        let out = std::mem::take(encoder.get_mut());
                        if !out.is_empty() {
                            return Some((Ok(Bytes::from(out)), Some((inner, encoder))));
                        }
                    }
                    Some(Err(err)) => return Some((Err(err), None)),
                    None => return Some((encoder.finish().map(Bytes::from), None)),
                }
            }
        },
    ))
}

/// Inflate a request body according to its `Content-Encoding`.
///
/// Only `gzip` (and `x-gzip`) is decoded; identity and absent encodings pass
/// through. Any other coding is rejected.
pub fn decode_request_body(encoding: Option<&str>, body: Bytes) -> Result<Bytes, String> {
    match encoding.map(str::trim) {
        None | Some("") => Ok(body),
        Some(coding) if coding.eq_ignore_ascii_case("identity") => Ok(body),
        Some(coding) if coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip") => {
            let mut out = Vec::new();
            GzDecoder::new(body.as_ref())
                .read_to_end(&mut out)
                .map_err(|e| format!("invalid gzip request body: {e}"))?;
            Ok(Bytes::from(out))
        }
        Some(coding) => Err(format!("unsupported content encoding: {coding}")),
    }
}
