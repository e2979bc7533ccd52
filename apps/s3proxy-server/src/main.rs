//! s3proxy server: an HTTP gateway in front of an S3 bucket.
//!
//! Serves GET/HEAD/PUT against a primary bucket, optionally reading through to
//! a secondary bucket on misses, and exposes `/_health` and `/metrics`.
//!
//! # Usage
//!
//! ```text
//! S3_PROXY_LISTEN=0.0.0.0:21080 \
//! S3_PROXY_PRIMARY_STORE_BUCKET=assets \
//! s3proxy-server
//! ```
//!
//! # Environment Variables
//!
//! See `ProxyConfig::from_env` for the full list. The most common ones:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `S3_PROXY_LISTEN` | `[::1]:21080` | Bind address |
//! | `S3_PROXY_PRIMARY_STORE_BUCKET` | *(required)* | Primary bucket |
//! | `S3_PROXY_READ_THROUGH` | `false` | Read through to the secondary bucket |
//! | `S3_PROXY_SECONDARY_STORE_BUCKET` | *(required with read-through)* | Secondary bucket |
//! | `S3_PROXY_LOG_LEVEL` | `info` | Log level filter |
//! | `S3_PROXY_LOG_FORMAT` | `text` | `json` for JSON lines |
//! | `S3_PROXY_SHUTDOWN_GRACE_SECS` | `600` | Drain period after a shutdown signal |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `S3_PROXY_LOG_LEVEL`) |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use s3proxy_core::s3::S3Store;
use s3proxy_core::{DualStoreFetcher, ObjectStore, ProxyConfig, ProxyMetrics};
use s3proxy_http::{ProxyHandler, ProxyHttpService};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the configured log level.
fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Connect the primary store and, with read-through enabled, the secondary one.
async fn build_fetcher(config: &ProxyConfig, metrics: Arc<ProxyMetrics>) -> DualStoreFetcher {
    let primary: Arc<dyn ObjectStore> = Arc::new(S3Store::from_config(&config.primary_store).await);
    let secondary: Option<Arc<dyn ObjectStore>> = if config.read_through {
        Some(Arc::new(S3Store::from_config(&config.secondary_store).await))
    } else {
        None
    };

    info!(
        primary = primary.name(),
        secondary = ?secondary.as_ref().map(|s| s.name()),
        "connected object stores"
    );

    DualStoreFetcher::new(primary, secondary, metrics)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("received shutdown signal, draining connections");
}

/// Address the health check connects to for a listen address that may be a wildcard.
fn health_check_address(listen: &str) -> String {
    listen
        .replace("0.0.0.0", "127.0.0.1")
        .replace("[::]", "[::1]")
}

/// Perform a health check by requesting `/_health` from a running instance.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /_health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.starts_with("HTTP/1.1 200") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::from_env();

    // Handle --health-check flag for container health checks.
    if std::env::args().any(|a| a == "--health-check") {
        let healthy = run_health_check(&health_check_address(&config.listen)).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level, config.log_json)?;
    config.validate().context("invalid configuration")?;

    info!(
        listen = %config.listen,
        read_through = config.read_through,
        primary_bucket = %config.primary_store.bucket,
        secondary_bucket = %config.secondary_store.bucket,
        strip_path = %config.http.strip_path,
        key_prefix = %config.http.key_prefix,
        directory_listing = config.http.directory_listing,
        version = VERSION,
        "starting s3proxy server",
    );

    let metrics = Arc::new(ProxyMetrics::new());
    let fetcher = build_fetcher(&config, Arc::clone(&metrics)).await;
    let handler = ProxyHandler::new(config.http.clone(), fetcher);
    let service = ProxyHttpService::new(handler, metrics);

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    s3proxy_http::serve(
        listener,
        service,
        shutdown_signal(),
        config.shutdown_grace_period(),
    )
    .await;

    Ok(())
}
