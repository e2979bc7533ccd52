//! [`ObjectStore`] implementation on top of `aws-sdk-s3`.
//!
//! The SDK client owns connection pooling, retries and request signing. This
//! module only translates between SDK shapes and the proxy's own types and
//! classifies SDK failures into [`ProxyError`]s.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region, SharedHttpClient};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_http_client::tls;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{ErrorKind, ProxyError, ProxyResult};
use crate::store::{ListOutput, ListedObject, ObjectBody, ObjectStore, PutOutput, StoredObject};

/// An S3 bucket reached through the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    name: String,
}

impl S3Store {
    /// Wrap an existing SDK client.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            client,
            name: format!("s3://{bucket}"),
            bucket,
        }
    }

    /// Build a client from a [`StoreConfig`].
    ///
    /// Static credentials are used when both keys are set; otherwise the SDK's
    /// default provider chain applies. Upstream connections are pooled per
    /// [`StoreConfig::max_idle_connections`] and
    /// [`StoreConfig::idle_connection_timeout`].
    pub async fn from_config(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .http_client(http_client(config));

        if !config.access_key.is_empty() && !config.secret_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "s3proxy-config",
            ));
        }
        if let Some(url) = config.endpoint_url() {
            loader = loader.endpoint_url(url);
        }
        if let Some(timeout) = config.operation_timeout() {
            loader = loader.timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Self::new(aws_sdk_s3::Client::from_conf(s3_config), config.bucket.clone())
    }

    /// The bucket this store reads and writes.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// HTTPS client with the store's idle-connection pool settings.
fn http_client(config: &StoreConfig) -> SharedHttpClient {
    aws_smithy_http_client::Builder::new()
        .pool_max_idle_per_host(config.max_idle_connections)
        .pool_idle_timeout(config.idle_connection_timeout())
        .tls_provider(tls::Provider::Rustls(
            tls::rustls_provider::CryptoMode::AwsLc,
        ))
        .build_https()
}

/// Classify an SDK failure.
///
/// Service errors are classified by their S3 error code, falling back to the
/// raw HTTP status (HEAD-style 404s carry no code). Transport failures map to
/// timeouts or upstream faults; anything else keeps its message as
/// [`ErrorKind::Unclassified`].
pub fn classify_sdk_error<E>(operation: &str, key: &str, err: SdkError<E>) -> ProxyError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!("{operation} {key}: {}", DisplayErrorContext(&err));
    let proxy_err = match &err {
        SdkError::ServiceError(service) => ProxyError::from_store_code(
            service.err().code(),
            Some(service.raw().status().as_u16()),
            message,
        ),
        SdkError::TimeoutError(_) => ProxyError::new(ErrorKind::UpstreamTimeout, message),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            ProxyError::new(ErrorKind::UpstreamTimeout, message)
        }
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProxyError::new(ErrorKind::UpstreamFault, message)
        }
        _ => ProxyError::new(ErrorKind::Unclassified, message),
    };
    proxy_err.with_source(err)
}

fn to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

fn into_body(stream: ByteStream) -> ObjectBody {
    ObjectBody::from_stream(futures::stream::unfold(stream, |mut stream| async move {
        stream
            .next()
            .await
            .map(|chunk| (chunk.map_err(std::io::Error::other), stream))
    }))
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str, range: Option<&str>) -> ProxyResult<StoredObject> {
        debug!(bucket = %self.bucket, key, range, "s3 get_object");
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(ToOwned::to_owned))
            .send()
            .await
            .map_err(|e| classify_sdk_error("GetObject", key, e))?;

        let last_modified = output.last_modified().and_then(to_chrono);
        let mut stored = StoredObject::new(ObjectBody::empty());
        stored.content_length = output.content_length();
        stored.cache_control = output.cache_control().map(ToOwned::to_owned);
        stored.content_disposition = output.content_disposition().map(ToOwned::to_owned);
        stored.content_encoding = output.content_encoding().map(ToOwned::to_owned);
        stored.content_language = output.content_language().map(ToOwned::to_owned);
        stored.content_range = output.content_range().map(ToOwned::to_owned);
        stored.content_type = output.content_type().map(ToOwned::to_owned);
        stored.e_tag = output.e_tag().map(ToOwned::to_owned);
        stored.expires = output.expires_string().map(ToOwned::to_owned);
        stored.last_modified = last_modified;
        stored.body = into_body(output.body);
        Ok(stored)
    }

    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> ProxyResult<PutOutput> {
        debug!(bucket = %self.bucket, key, size = body.len(), "s3 put_object");
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(ToOwned::to_owned))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify_sdk_error("PutObject", key, e))?;

        Ok(PutOutput {
            e_tag: output.e_tag().map(ToOwned::to_owned),
            version_id: output.version_id().map(ToOwned::to_owned),
            upload_id: None,
            location: None,
        })
    }

    async fn list(&self, prefix: &str) -> ProxyResult<ListOutput> {
        debug!(bucket = %self.bucket, prefix, "s3 list_objects_v2");
        let mut out = ListOutput::default();
        let mut continuation_token = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| classify_sdk_error("ListObjectsV2", prefix, e))?;

            out.common_prefixes.extend(
                resp.common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(ToOwned::to_owned)),
            );
            out.contents.extend(resp.contents().iter().filter_map(|obj| {
                obj.key().map(|key| ListedObject {
                    key: key.to_owned(),
                    last_modified: obj.last_modified().and_then(to_chrono),
                })
            }));

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(out)
    }
}
