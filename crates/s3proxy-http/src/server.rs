//! Accept loop with graceful, time-bounded shutdown.

use std::future::Future;
use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::service::ProxyHttpService;

/// Serve connections until `shutdown` resolves, then drain in-flight
/// connections for at most `grace`.
///
/// Returns `true` when every connection finished within the grace period.
pub async fn serve(
    listener: TcpListener,
    service: ProxyHttpService,
    shutdown: impl Future<Output = ()>,
    grace: Duration,
) -> bool {
    let graceful = GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!(grace_secs = grace.as_secs(), "shutting down gracefully");
                break;
            }
        }
    }

    // Stop accepting before draining.
    drop(listener);

    if tokio::time::timeout(grace, graceful.shutdown()).await.is_ok() {
        info!("all connections drained, exiting");
        true
    } else {
        warn!(grace_secs = grace.as_secs(), "grace period elapsed with connections still open");
        false
    }
}
