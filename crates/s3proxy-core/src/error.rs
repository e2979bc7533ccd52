//! Error classification for object-store failures.
//!
//! Every failure in the pipeline is a [`ProxyError`] carrying an [`ErrorKind`].
//! The kind is decided once, where the failure happens (usually from an S3 error
//! code), and the HTTP layer only reads [`ProxyError::status_code`].
//!
//! ```
//! use s3proxy_core::error::{ErrorKind, ProxyError};
//!
//! let err = ProxyError::from_store_code(Some("NoSuchKey"), None, "missing");
//! assert_eq!(err.kind, ErrorKind::NotFound);
//! assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
//! ```

use std::fmt;

/// Classified failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The bucket or key does not exist.
    NotFound,
    /// The store refused access.
    AccessDenied,
    /// Malformed bucket name, key, or request.
    BadRequest,
    /// The store rejected the requested byte range.
    RangeNotSatisfiable,
    /// The store (or the connection to it) timed out.
    UpstreamTimeout,
    /// The store failed internally or could not be reached.
    UpstreamFault,
    /// Anything else. The original message is kept for diagnostics.
    Unclassified,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    #[must_use]
    pub fn status_code(self) -> http::StatusCode {
        match self {
            Self::NotFound => http::StatusCode::NOT_FOUND,
            Self::AccessDenied => http::StatusCode::FORBIDDEN,
            Self::BadRequest => http::StatusCode::BAD_REQUEST,
            Self::RangeNotSatisfiable => http::StatusCode::RANGE_NOT_SATISFIABLE,
            Self::UpstreamTimeout => http::StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamFault => http::StatusCode::BAD_GATEWAY,
            Self::Unclassified => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify an S3 error code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let kind = match code {
            "NoSuchKey" | "NoSuchBucket" | "NotFound" | "NoSuchVersion" => Self::NotFound,
            "AccessDenied" | "AllAccessDisabled" | "Forbidden" | "AccountProblem"
            | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "InvalidObjectState" => {
                Self::AccessDenied
            }
            "InvalidBucketName" | "KeyTooLongError" | "InvalidArgument" | "InvalidRequest"
            | "InvalidURI" | "BadRequest" | "MalformedXML" | "AuthorizationHeaderMalformed" => {
                Self::BadRequest
            }
            "InvalidRange" => Self::RangeNotSatisfiable,
            "RequestTimeout" | "RequestTimeTooSkewed" => Self::UpstreamTimeout,
            "InternalError" | "ServiceUnavailable" | "SlowDown" | "ServiceFailure" => {
                Self::UpstreamFault
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Classify a raw HTTP status returned by the store when no code is available.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 | 403 => Self::AccessDenied,
            404 => Self::NotFound,
            416 => Self::RangeNotSatisfiable,
            408 | 504 => Self::UpstreamTimeout,
            500..=599 => Self::UpstreamFault,
            _ => Self::Unclassified,
        }
    }

    /// Whether this is a definitive miss.
    #[must_use]
    pub fn is_not_found(self) -> bool {
        self == Self::NotFound
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "NotFound",
            Self::AccessDenied => "AccessDenied",
            Self::BadRequest => "BadRequest",
            Self::RangeNotSatisfiable => "RangeNotSatisfiable",
            Self::UpstreamTimeout => "UpstreamTimeout",
            Self::UpstreamFault => "UpstreamFault",
            Self::Unclassified => "Unclassified",
        };
        f.write_str(s)
    }
}

/// A classified pipeline failure.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProxyError {
    /// The failure category.
    pub kind: ErrorKind,
    /// Store error code, when the store supplied one.
    pub code: Option<String>,
    /// Human-readable message returned to the client.
    pub message: String,
    /// Underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProxyError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Classify a store failure from its error code and, failing that, its HTTP
    /// status. Unknown failures become [`ErrorKind::Unclassified`].
    #[must_use]
    pub fn from_store_code(code: Option<&str>, status: Option<u16>, message: impl Into<String>) -> Self {
        let kind = code
            .and_then(ErrorKind::from_code)
            .or_else(|| status.map(ErrorKind::from_status))
            .unwrap_or(ErrorKind::Unclassified);
        Self {
            kind,
            code: code.map(ToOwned::to_owned),
            message: message.into(),
            source: None,
        }
    }

    /// The key does not exist.
    #[must_use]
    pub fn not_found(key: &str) -> Self {
        let mut err = Self::new(ErrorKind::NotFound, format!("The specified key does not exist: {key}"));
        err.code = Some("NoSuchKey".to_owned());
        err
    }

    /// An internal failure with a preserved message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        self.kind.status_code()
    }
}

/// Convenience result type for pipeline operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
