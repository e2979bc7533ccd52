//! End-to-end tests for the s3proxy server.
//!
//! Most tests start the proxy in-process on an ephemeral port, backed by
//! in-memory stores, and talk to it over real HTTP with `reqwest`.
//!
//! Tests in `test_live_s3` need an S3-compatible endpoint at
//! `S3_ENDPOINT_URL` (default `http://localhost:4566`). They are marked
//! `#[ignore]` so they don't run during normal `cargo test`. Run them with:
//!
//! ```text
//! cargo test -p s3proxy-integration -- --ignored
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use s3proxy_core::memory::MemoryStore;
use s3proxy_core::{DualStoreFetcher, HttpOptions, ObjectStore, ProxyMetrics};
use s3proxy_http::{ProxyHandler, ProxyHttpService};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A proxy running on an ephemeral local port.
#[derive(Debug)]
pub struct TestProxy {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<bool>,
}

impl TestProxy {
    /// Start a proxy over the given stores.
    pub async fn start(
        options: HttpOptions,
        primary: Arc<dyn ObjectStore>,
        secondary: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        init_tracing();

        let metrics = Arc::new(ProxyMetrics::new());
        let fetcher = DualStoreFetcher::new(primary, secondary, Arc::clone(&metrics));
        let service = ProxyHttpService::new(ProxyHandler::new(options, fetcher), metrics);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(s3proxy_http::serve(
            listener,
            service,
            async {
                rx.await.ok();
            },
            Duration::from_secs(5),
        ));

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    /// URL of `path` on this proxy.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Stop accepting and wait for the drain. Returns whether it completed in time.
    pub async fn stop(mut self) -> bool {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await.unwrap_or(false)
    }
}

/// A proxy over two in-memory stores.
#[derive(Debug)]
pub struct MemoryProxy {
    /// The running proxy.
    pub proxy: TestProxy,
    /// Primary store.
    pub primary: Arc<MemoryStore>,
    /// Secondary store (consulted only when read-through is enabled).
    pub secondary: Arc<MemoryStore>,
}

impl MemoryProxy {
    /// Start a proxy over fresh in-memory stores.
    pub async fn start(options: HttpOptions, read_through: bool) -> Self {
        let primary = Arc::new(MemoryStore::new("memory://primary"));
        let secondary = Arc::new(MemoryStore::new("memory://secondary"));

        let secondary_store: Option<Arc<dyn ObjectStore>> = if read_through {
            Some(secondary.clone())
        } else {
            None
        };
        let proxy = TestProxy::start(options, primary.clone(), secondary_store).await;

        Self {
            proxy,
            primary,
            secondary,
        }
    }

    /// URL of `path` on the proxy.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        self.proxy.url(path)
    }
}

/// HTTP client for talking to a test proxy.
#[must_use]
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client")
}

/// Endpoint URL for the live S3-compatible server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create a configured S3 client pointing at the live server.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return; // Bucket may not exist.
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_listing;
mod test_live_s3;
mod test_object;
mod test_symlink;
