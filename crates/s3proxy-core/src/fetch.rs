//! Primary-first fetching with optional read-through to a secondary store.
//!
//! The secondary store is a miss-recovery mechanism, not a redundancy one: it
//! is consulted only when the primary gives a definitive "not found". Any other
//! primary failure (access denied, bad request, timeouts) is returned as is.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ProxyResult;
use crate::metrics::ProxyMetrics;
use crate::store::{ObjectStore, StoredObject};

/// Fetches objects from the primary store, reading through to the secondary
/// store on a miss when one is configured.
#[derive(Debug, Clone)]
pub struct DualStoreFetcher {
    primary: Arc<dyn ObjectStore>,
    secondary: Option<Arc<dyn ObjectStore>>,
    metrics: Arc<ProxyMetrics>,
}

impl DualStoreFetcher {
    /// Create a fetcher. Passing `None` for `secondary` disables read-through.
    #[must_use]
    pub fn new(
        primary: Arc<dyn ObjectStore>,
        secondary: Option<Arc<dyn ObjectStore>>,
        metrics: Arc<ProxyMetrics>,
    ) -> Self {
        Self {
            primary,
            secondary,
            metrics,
        }
    }

    /// The primary store.
    #[must_use]
    pub fn primary(&self) -> &Arc<dyn ObjectStore> {
        &self.primary
    }

    /// Whether read-through to a secondary store is enabled.
    #[must_use]
    pub fn read_through_enabled(&self) -> bool {
        self.secondary.is_some()
    }

    /// Fetch `key`, forwarding `range` verbatim to whichever store serves it.
    ///
    /// When the secondary store is consulted, its result (success or failure)
    /// is returned and the primary error is discarded.
    pub async fn fetch(&self, key: &str, range: Option<&str>) -> ProxyResult<StoredObject> {
        let primary_err = match self.primary.get(key, range).await {
            Ok(obj) => return Ok(obj),
            Err(err) => err,
        };

        let Some(secondary) = self.secondary.as_ref().filter(|_| primary_err.kind.is_not_found())
        else {
            return Err(primary_err);
        };

        debug!(
            key,
            primary = self.primary.name(),
            secondary = secondary.name(),
            "primary miss, reading through to secondary store"
        );

        let obj = secondary.get(key, range).await?;
        self.metrics.record_read_through();
        info!(key, store = secondary.name(), "served from secondary store");
        Ok(obj)
    }
}
