//! Bounded-parallel DNS enrichment
//!
//! Resolves A and CNAME records for a batch of names with at most
//! `max_workers` names in flight. Failures and timeouts degrade to "no
//! records"; names with no records at all are dropped from the output.

use futures::stream::{self, StreamExt};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::traits::{DnsRecord, DnsResolver};

/// Resolves newly discovered names
#[derive(Clone)]
pub struct ResolutionDispatcher {
    resolver: Arc<dyn DnsResolver>,
    max_workers: usize,
    query_timeout: Duration,
}

impl ResolutionDispatcher {
    /// Create a dispatcher
    ///
    /// `max_workers` is clamped to at least 1.
    pub fn new(resolver: Arc<dyn DnsResolver>, max_workers: usize, query_timeout: Duration) -> Self {
        Self {
            resolver,
            max_workers: max_workers.max(1),
            query_timeout,
        }
    }

    /// Resolve every name, returning records for those that resolved
    ///
    /// Output order is unspecified.
    pub async fn resolve_all<I>(&self, names: I) -> Vec<DnsRecord>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let total = names.len();

        let records: Vec<DnsRecord> = stream::iter(names)
            .map(|name| self.resolve_one(name))
            .buffer_unordered(self.max_workers)
            .filter_map(|record| async move { record.is_resolved().then_some(record) })
            .collect()
            .await;

        debug!(
            resolver = self.resolver.resolver_name(),
            total,
            resolved = records.len(),
            "Resolution batch complete"
        );

        records
    }

    /// Resolve a single name; never fails
    pub async fn resolve_one(&self, name: String) -> DnsRecord {
        let (a, cname) = tokio::join!(self.query_a(&name), self.query_cname(&name));
        DnsRecord {
            subdomain: name,
            a,
            cname,
        }
    }

    async fn query_a(&self, name: &str) -> Vec<Ipv4Addr> {
        match tokio::time::timeout(self.query_timeout, self.resolver.lookup_a(name)).await {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                debug!(name, "A lookup failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                debug!(name, "A lookup timed out");
                Vec::new()
            }
        }
    }

    async fn query_cname(&self, name: &str) -> Vec<String> {
        match tokio::time::timeout(self.query_timeout, self.resolver.lookup_cname(name)).await {
            Ok(Ok(targets)) => targets,
            Ok(Err(e)) => {
                debug!(name, "CNAME lookup failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                debug!(name, "CNAME lookup timed out");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for ResolutionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionDispatcher")
            .field("resolver", &self.resolver.resolver_name())
            .field("max_workers", &self.max_workers)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
