//! Store results to HTTP responses.
//!
//! - **Objects** ([`object_response`]): metadata headers, configured overrides,
//!   200 or 206, and the streamed body (dropped for HEAD).
//! - **Uploads** ([`put_response`]): 202 with the identifiers the store reported.
//! - **Listings** ([`listing_response`]): a rendered HTML or JSON page.
//! - **Errors** ([`error_to_response`]): the classified status with a
//!   `text/plain` message.
//!
//! Every header is skipped when its value is absent or empty.

use chrono::{DateTime, Utc};
use http::header::{self, HeaderName, HeaderValue};
use s3proxy_core::{HttpOptions, ProxyError, PutOutput, StoredObject};
use tracing::{debug, warn};

use crate::body::ProxyResponseBody;

/// `Last-Modified` / `Expires` date format (RFC 7231 IMF-fixdate).
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Proxy HTTP response.
pub type ProxyResponse = http::Response<ProxyResponseBody>;

/// Set a header when the value is present and non-empty.
///
/// Values are taken as raw bytes so stored metadata with non-ASCII text (for
/// example a UTF-8 `Content-Disposition` filename) survives. Values containing
/// control characters cannot be sent and are dropped with a debug log.
fn set_optional_header(
    builder: http::response::Builder,
    name: HeaderName,
    value: Option<&str>,
) -> http::response::Builder {
    let Some(v) = value.filter(|v| !v.is_empty()) else {
        return builder;
    };
    match HeaderValue::from_bytes(v.as_bytes()) {
        Ok(hv) => builder.header(name, hv),
        Err(_) => {
            debug!(header = %name, value = v, "dropping header with invalid value");
            builder
        }
    }
}

/// Set an HTTP date header for a non-zero timestamp.
fn set_optional_timestamp_header(
    builder: http::response::Builder,
    name: HeaderName,
    value: Option<&DateTime<Utc>>,
) -> http::response::Builder {
    match value.filter(|ts| ts.timestamp() != 0) {
        Some(ts) => builder.header(name, ts.format(HTTP_DATE_FORMAT).to_string()),
        None => builder,
    }
}

/// A configured override wins over the stored value when non-empty.
fn override_or<'a>(configured: &'a str, stored: Option<&'a str>) -> Option<&'a str> {
    if configured.is_empty() {
        stored
    } else {
        Some(configured)
    }
}

fn has_header(builder: &http::response::Builder, name: &HeaderName) -> bool {
    builder
        .headers_ref()
        .is_some_and(|headers| headers.contains_key(name))
}

/// Build a response, converting build errors to [`ProxyError`].
fn build_response(
    builder: http::response::Builder,
    body: ProxyResponseBody,
) -> Result<ProxyResponse, ProxyError> {
    builder
        .body(body)
        .map_err(|e| ProxyError::internal(format!("failed to build response: {e}")).with_source(e))
}

/// Translate a fetched object into a response.
///
/// For HEAD the object body is dropped here, which releases the store
/// connection without reading it.
pub fn object_response(
    object: StoredObject,
    options: &HttpOptions,
    head: bool,
) -> Result<ProxyResponse, ProxyError> {
    let status = if object.is_partial() {
        http::StatusCode::PARTIAL_CONTENT
    } else {
        http::StatusCode::OK
    };

    let mut builder = http::Response::builder().status(status);
    builder = set_optional_header(
        builder,
        header::CACHE_CONTROL,
        override_or(&options.cache_control, object.cache_control.as_deref()),
    );
    builder = set_optional_header(
        builder,
        header::EXPIRES,
        override_or(&options.expires, object.expires.as_deref()),
    );
    builder = set_optional_header(
        builder,
        header::CONTENT_DISPOSITION,
        object.content_disposition.as_deref(),
    );
    builder = set_optional_header(
        builder,
        header::CONTENT_ENCODING,
        object.content_encoding.as_deref(),
    );
    builder = set_optional_header(
        builder,
        header::CONTENT_LANGUAGE,
        object.content_language.as_deref(),
    );

    // The stored length describes the encoded bytes; leave framing to hyper
    // once an encoding is declared.
    if !has_header(&builder, &header::CONTENT_ENCODING) {
        if let Some(len) = object.content_length.filter(|len| *len > 0) {
            builder = builder.header(header::CONTENT_LENGTH, len);
        }
    }

    builder = set_optional_header(builder, header::CONTENT_RANGE, object.content_range.as_deref());
    builder = set_optional_header(builder, header::CONTENT_TYPE, object.content_type.as_deref());
    builder = set_optional_header(builder, header::ETAG, object.e_tag.as_deref());
    builder = set_optional_timestamp_header(
        builder,
        header::LAST_MODIFIED,
        object.last_modified.as_ref(),
    );

    let body = if head {
        ProxyResponseBody::empty()
    } else {
        ProxyResponseBody::from_stream(object.body.into_stream())
    };
    build_response(builder, body)
}

/// Acknowledge an upload with 202 and the identifiers the store reported.
pub fn put_response(output: &PutOutput) -> Result<ProxyResponse, ProxyError> {
    let mut builder = http::Response::builder().status(http::StatusCode::ACCEPTED);
    builder = set_optional_header(builder, header::ETAG, output.e_tag.as_deref());
    builder = set_optional_header(
        builder,
        HeaderName::from_static("versionid"),
        output.version_id.as_deref(),
    );
    builder = set_optional_header(
        builder,
        HeaderName::from_static("uploadid"),
        output.upload_id.as_deref(),
    );
    builder = set_optional_header(builder, header::LOCATION, output.location.as_deref());
    build_response(builder, ProxyResponseBody::empty())
}

/// A rendered listing page.
pub fn listing_response(
    body: String,
    content_type: &'static str,
    head: bool,
) -> Result<ProxyResponse, ProxyError> {
    let builder = http::Response::builder()
        .status(http::StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, body.len());
    let body = if head {
        ProxyResponseBody::empty()
    } else {
        ProxyResponseBody::from_string(body)
    };
    build_response(builder, body)
}

/// An empty response with the given status.
#[must_use]
pub fn empty_response(status: http::StatusCode) -> ProxyResponse {
    let mut response = http::Response::new(ProxyResponseBody::empty());
    *response.status_mut() = status;
    response
}

/// Convert a [`ProxyError`] into a `text/plain` response carrying its message.
#[must_use]
pub fn error_to_response(err: &ProxyError) -> ProxyResponse {
    text_response(err.status_code(), &err.message)
}

/// A `text/plain` response with a newline-terminated message.
#[must_use]
pub fn text_response(status: http::StatusCode, message: &str) -> ProxyResponse {
    http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(ProxyResponseBody::from_string(format!("{message}\n")))
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build error response");
            empty_response(http::StatusCode::INTERNAL_SERVER_ERROR)
        })
}

/// Unwrap a translated response, falling back to the error response.
#[must_use]
pub fn into_response(result: Result<ProxyResponse, ProxyError>) -> ProxyResponse {
    result.unwrap_or_else(|err| error_to_response(&err))
}
