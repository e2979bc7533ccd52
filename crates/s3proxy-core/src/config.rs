//! Proxy configuration.
//!
//! Provides [`ProxyConfig`], the immutable configuration value built once at
//! startup and shared by reference with every component. Values are loaded from
//! `S3_PROXY_*` environment variables; anything unset keeps its default.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Prefix shared by every environment variable the proxy reads.
const ENV_PREFIX: &str = "S3_PROXY_";

/// Errors raised while validating a [`ProxyConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A store that must be reachable has no bucket configured.
    #[error("no bucket configured for the {store} store")]
    MissingBucket {
        /// Which store (`primary` or `secondary`).
        store: &'static str,
    },

    /// A value could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// The setting name.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// Output format for directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingFormat {
    /// An HTML page with one anchor per entry.
    #[default]
    Html,
    /// A JSON array of entry names.
    Json,
}

impl FromStr for ListingFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("html") {
            Ok(Self::Html)
        } else if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(ConfigError::InvalidValue {
                name: "directory listing format".to_owned(),
                value: s.to_owned(),
            })
        }
    }
}

impl fmt::Display for ListingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => f.write_str("html"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Options that shape how request paths map onto keys and responses.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct HttpOptions {
    /// Prefix removed from the request path before anything else.
    #[builder(default)]
    pub strip_path: String,

    /// Prefix prepended to the resolved path to build the store key.
    #[builder(default)]
    pub key_prefix: String,

    /// Document appended to directory paths when listings are disabled.
    #[builder(default = String::from("index.html"))]
    pub index_document: String,

    /// Whether paths ending in `/` render a directory listing.
    #[builder(default = false)]
    pub directory_listing: bool,

    /// Listing output format.
    #[builder(default)]
    pub listing_format: ListingFormat,

    /// Overrides the store's `Cache-Control` header when non-empty.
    #[builder(default)]
    pub cache_control: String,

    /// Overrides the store's `Expires` header when non-empty.
    #[builder(default)]
    pub expires: String,

    /// Additional health-check path, matched after prefix stripping.
    #[builder(default)]
    pub health_check_path: String,

    /// Value of the `Facility` header added to every response.
    #[builder(default)]
    pub facility: String,

    /// Gzip responses for clients that accept it and inflate gzip uploads.
    #[builder(default = true)]
    pub compression: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Connection settings for one backing store.
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Bucket name.
    #[builder(default)]
    pub bucket: String,

    /// Region of the bucket.
    #[builder(default = String::from("us-east-1"))]
    pub region: String,

    /// Endpoint, either a hostname or a fully qualified URI. Empty means AWS.
    #[builder(default)]
    pub endpoint: String,

    /// Static access key. When empty the default credential chain is used.
    #[builder(default)]
    pub access_key: String,

    /// Static secret key.
    #[builder(default)]
    #[serde(skip_serializing)]
    pub secret_key: String,

    /// Use plain HTTP for hostname-only endpoints.
    #[builder(default = false)]
    pub disable_bucket_ssl: bool,

    /// Address buckets by path instead of virtual host.
    #[builder(default = false)]
    pub force_path_style: bool,

    /// Per-operation timeout in seconds; zero disables it.
    #[builder(default = 0)]
    pub operation_timeout_secs: u64,

    /// Idle connections kept open per upstream host.
    #[builder(default = 150)]
    pub max_idle_connections: usize,

    /// Seconds an idle upstream connection is kept; zero keeps it indefinitely.
    #[builder(default = 10)]
    pub idle_connection_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field(
                "secret_key",
                &if self.secret_key.is_empty() { "" } else { "***" },
            )
            .field("disable_bucket_ssl", &self.disable_bucket_ssl)
            .field("force_path_style", &self.force_path_style)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("max_idle_connections", &self.max_idle_connections)
            .field("idle_connection_timeout_secs", &self.idle_connection_timeout_secs)
            .finish()
    }
}

impl StoreConfig {
    /// Endpoint URL to hand to the SDK, if one is configured.
    ///
    /// Hostname-only endpoints get `https://`, or `http://` when bucket SSL is
    /// disabled.
    #[must_use]
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return None;
        }
        if endpoint.contains("://") {
            return Some(endpoint.to_owned());
        }
        let scheme = if self.disable_bucket_ssl { "http" } else { "https" };
        Some(format!("{scheme}://{endpoint}"))
    }

    /// The operation timeout, if enabled.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then_some(Duration::from_secs(self.operation_timeout_secs))
    }

    /// How long idle upstream connections are pooled, if bounded.
    #[must_use]
    pub fn idle_connection_timeout(&self) -> Option<Duration> {
        (self.idle_connection_timeout_secs > 0)
            .then_some(Duration::from_secs(self.idle_connection_timeout_secs))
    }

    fn load(&mut self, store: &str, lookup: &impl Fn(&str) -> Option<String>) {
        let var = |field: &str| lookup(&format!("{ENV_PREFIX}{store}_{field}"));

        if let Some(v) = var("BUCKET") {
            self.bucket = v;
        }
        if let Some(v) = var("REGION") {
            self.region = v;
        }
        if let Some(v) = var("ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = var("DISABLE_BUCKET_SSL") {
            self.disable_bucket_ssl = parse_bool(&v);
        }
        if let Some(v) = var("FORCE_PATH_STYLE") {
            self.force_path_style = parse_bool(&v);
        }
        if let Some(v) = var("OPERATION_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(n) => self.operation_timeout_secs = n,
                Err(_) => warn_invalid(&format!("{store}_OPERATION_TIMEOUT_SECS"), &v),
            }
        }
        if let Some(v) = var("MAX_IDLE_CONNECTIONS") {
            match v.parse::<usize>() {
                Ok(n) => self.max_idle_connections = n,
                Err(_) => warn_invalid(&format!("{store}_MAX_IDLE_CONNECTIONS"), &v),
            }
        }
        if let Some(v) = var("IDLE_CONNECTION_TIMEOUT") {
            match v.parse::<u64>() {
                Ok(n) => self.idle_connection_timeout_secs = n,
                Err(_) => warn_invalid(&format!("{store}_IDLE_CONNECTION_TIMEOUT"), &v),
            }
        }

        // Credentials are also accepted without the prefix, e.g. PRIMARY_STORE_ACCESS_KEY.
        if let Some(v) = var("ACCESS_KEY").or_else(|| lookup(&format!("{store}_ACCESS_KEY"))) {
            self.access_key = v;
        }
        if let Some(v) = var("SECRET_KEY").or_else(|| lookup(&format!("{store}_SECRET_KEY"))) {
            self.secret_key = v;
        }
    }
}

/// Top-level proxy configuration.
///
/// # Examples
///
/// ```
/// use s3proxy_core::config::ProxyConfig;
///
/// let config = ProxyConfig::default();
/// assert_eq!(config.listen, "[::1]:21080");
/// assert!(!config.read_through);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Bind address (e.g. `"0.0.0.0:21080"`).
    #[builder(default = String::from("[::1]:21080"))]
    pub listen: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human readable text.
    #[builder(default = false)]
    pub log_json: bool,

    /// How long in-flight requests may run after a shutdown signal, in seconds.
    #[builder(default = 600)]
    pub shutdown_grace_secs: u64,

    /// Read through to the secondary store when the primary reports a miss.
    #[builder(default = false)]
    pub read_through: bool,

    /// Path and header options.
    #[builder(default)]
    pub http: HttpOptions,

    /// The store every request goes to first.
    #[builder(default)]
    pub primary_store: StoreConfig,

    /// The read-through store.
    #[builder(default)]
    pub secondary_store: StoreConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProxyConfig {
    /// Load configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3_PROXY_LISTEN` | `[::1]:21080` |
    /// | `S3_PROXY_LOG_LEVEL` | `info` |
    /// | `S3_PROXY_LOG_FORMAT` | `text` (`json` for JSON lines) |
    /// | `S3_PROXY_SHUTDOWN_GRACE_SECS` | `600` |
    /// | `S3_PROXY_READ_THROUGH` | `false` |
    /// | `S3_PROXY_STRIP_PATH` | *(empty)* |
    /// | `S3_PROXY_KEY_PREFIX` | *(empty)* |
    /// | `S3_PROXY_INDEX_DOCUMENT` | `index.html` |
    /// | `S3_PROXY_DIRECTORY_LISTING` | `false` |
    /// | `S3_PROXY_DIRECTORY_LISTING_FORMAT` | `html` |
    /// | `S3_PROXY_HTTP_CACHE_CONTROL` | *(empty)* |
    /// | `S3_PROXY_HTTP_EXPIRES` | *(empty)* |
    /// | `S3_PROXY_HEALTHCHECK_PATH` | *(empty)* |
    /// | `S3_PROXY_FACILITY` | *(empty)* |
    /// | `S3_PROXY_COMPRESSION` | `true` |
    /// | `S3_PROXY_{PRIMARY,SECONDARY}_STORE_*` | see [`StoreConfig`] |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("LISTEN") {
            config.listen = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = var("LOG_FORMAT") {
            config.log_json = v.eq_ignore_ascii_case("json");
        }
        if let Some(v) = var("SHUTDOWN_GRACE_SECS") {
            match v.parse::<u64>() {
                Ok(n) => config.shutdown_grace_secs = n,
                Err(_) => warn_invalid("SHUTDOWN_GRACE_SECS", &v),
            }
        }
        if let Some(v) = var("READ_THROUGH") {
            config.read_through = parse_bool(&v);
        }

        let http = &mut config.http;
        if let Some(v) = var("STRIP_PATH") {
            http.strip_path = v;
        }
        if let Some(v) = var("KEY_PREFIX") {
            http.key_prefix = v;
        }
        if let Some(v) = var("INDEX_DOCUMENT") {
            http.index_document = v;
        }
        if let Some(v) = var("DIRECTORY_LISTING") {
            http.directory_listing = parse_bool(&v);
        }
        if let Some(v) = var("DIRECTORY_LISTING_FORMAT") {
            match v.parse() {
                Ok(format) => http.listing_format = format,
                Err(_) => warn_invalid("DIRECTORY_LISTING_FORMAT", &v),
            }
        }
        if let Some(v) = var("HTTP_CACHE_CONTROL") {
            http.cache_control = v;
        }
        if let Some(v) = var("HTTP_EXPIRES") {
            http.expires = v;
        }
        if let Some(v) = var("HEALTHCHECK_PATH") {
            http.health_check_path = v;
        }
        if let Some(v) = var("FACILITY") {
            http.facility = v;
        }
        if let Some(v) = var("COMPRESSION") {
            http.compression = parse_bool(&v);
        }

        config.primary_store.load("PRIMARY_STORE", &lookup);
        config.secondary_store.load("SECONDARY_STORE", &lookup);

        config
    }

    /// Check that every store the configuration relies on is addressable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_store.bucket.is_empty() {
            return Err(ConfigError::MissingBucket { store: "primary" });
        }
        if self.read_through && self.secondary_store.bucket.is_empty() {
            return Err(ConfigError::MissingBucket { store: "secondary" });
        }
        Ok(())
    }

    /// The shutdown grace period as a [`Duration`].
    #[must_use]
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn warn_invalid(name: &str, value: &str) {
    tracing::warn!(
        variable = %format!("{ENV_PREFIX}{name}"),
        value,
        "ignoring invalid configuration value"
    );
}
