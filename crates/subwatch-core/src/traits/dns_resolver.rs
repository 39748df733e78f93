// # DNS Resolver Trait
//
// Defines the DNS transport used to enrich newly discovered names.
//
// ## Implementations
//
// - hickory-resolver: `subwatch-resolver-hickory` crate
//
// The resolver answers single record-type queries. Fan-out, bounded
// parallelism and failure tolerance live in `ResolutionDispatcher`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// DNS records found for one subdomain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// The resolved subdomain
    pub subdomain: String,
    /// A record addresses
    pub a: Vec<Ipv4Addr>,
    /// CNAME targets, without the trailing root dot
    pub cname: Vec<String>,
}

impl DnsRecord {
    /// Create an empty (unresolved) record
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            a: Vec::new(),
            cname: Vec::new(),
        }
    }

    /// Whether at least one record type resolved
    pub fn is_resolved(&self) -> bool {
        !self.a.is_empty() || !self.cname.is_empty()
    }
}

/// Trait for DNS resolver implementations
///
/// "No record of this type" (NXDOMAIN, empty answer) is `Ok(vec![])`.
/// Transport problems (timeouts, unreachable nameservers) are errors; the
/// dispatcher treats both the same way but logs them differently.
///
/// # Trust Level: Untrusted
///
/// Resolvers must not retry beyond their transport's own attempt settings and
/// must not spawn tasks that outlive a query.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Look up A records for `name`
    async fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, crate::Error>;

    /// Look up CNAME records for `name`
    async fn lookup_cname(&self, name: &str) -> Result<Vec<String>, crate::Error>;

    /// Resolver name (for logging/debugging)
    fn resolver_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS resolvers from configuration
pub trait DnsResolverFactory: Send + Sync {
    /// Create a DnsResolver instance from configuration
    fn create(
        &self,
        config: &crate::config::ResolverConfig,
    ) -> Result<Box<dyn DnsResolver>, crate::Error>;
}
