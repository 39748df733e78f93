//! Multi-source fan-out
//!
//! Queries every configured connector concurrently and merges their output
//! into one normalized snapshot. A connector that fails or takes too long
//! contributes nothing; the rest still count.

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::normalize::normalize;
use crate::traits::SourceConnector;

/// Aggregates subdomain names from several sources
#[derive(Clone)]
pub struct SourceAggregator {
    connectors: Vec<Arc<dyn SourceConnector>>,
    fetch_timeout: Duration,
}

impl SourceAggregator {
    /// Create an aggregator over `connectors`
    ///
    /// Each fetch is bounded by `fetch_timeout`.
    pub fn new(connectors: Vec<Arc<dyn SourceConnector>>, fetch_timeout: Duration) -> Self {
        Self {
            connectors,
            fetch_timeout,
        }
    }

    /// Fetch from all sources and return the union of their normalized names
    ///
    /// Never fails. With every source down the result is empty.
    pub async fn aggregate(&self, domain: &str) -> BTreeSet<String> {
        let fetches = self.connectors.iter().map(|connector| {
            let connector = Arc::clone(connector);
            async move {
                match tokio::time::timeout(self.fetch_timeout, connector.fetch(domain)).await {
                    Ok(raw) => {
                        let names = normalize(&raw);
                        debug!(
                            source = connector.source_name(),
                            domain,
                            raw = raw.len(),
                            normalized = names.len(),
                            "Source fetch complete"
                        );
                        names
                    }
                    Err(_) => {
                        warn!(
                            source = connector.source_name(),
                            domain,
                            "Source fetch timed out after {:?}",
                            self.fetch_timeout
                        );
                        BTreeSet::new()
                    }
                }
            }
        });

        join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

impl std::fmt::Debug for SourceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.connectors.iter().map(|c| c.source_name()).collect();
        f.debug_struct("SourceAggregator")
            .field("connectors", &names)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}
