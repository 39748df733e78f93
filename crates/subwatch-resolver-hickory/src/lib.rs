// # Hickory DNS Resolver
//
// `DnsResolver` implementation backed by hickory-resolver.
//
// Queries go straight to the configured nameservers over UDP with TCP
// fallback. The system resolv.conf and hosts file are not consulted, so the
// results do not depend on the machine the daemon runs on.
//
// ## Answer Mapping
//
// - Records found: `Ok(records)`
// - NXDOMAIN / empty answer: `Ok(vec![])`
// - Timeouts, refused or unreachable servers: `Err(ResolutionFailure)`

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig as HickoryConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, RecordType};
use std::net::Ipv4Addr;
use subwatch_core::config::ResolverConfig;
use subwatch_core::traits::{DnsResolver, DnsResolverFactory};
use subwatch_core::{Error, PluginRegistry, Result};

const DNS_PORT: u16 = 53;

/// DNS resolver over hickory-resolver
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
}

impl std::fmt::Debug for HickoryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryResolver").finish_non_exhaustive()
    }
}

impl HickoryResolver {
    /// Create a resolver for the configured nameservers
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        config.validate()?;

        let nameservers =
            NameServerConfigGroup::from_ips_clear(&config.nameservers, DNS_PORT, true);
        let hickory_config = HickoryConfig::from_parts(None, vec![], nameservers);

        let mut opts = ResolverOpts::default();
        opts.timeout = config.query_timeout();
        opts.attempts = 1;
        opts.use_hosts_file = false;
        opts.rotate = true;

        tracing::debug!(
            nameservers = config.nameservers.len(),
            timeout = ?opts.timeout,
            "Creating hickory resolver"
        );

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(hickory_config, opts),
        })
    }
}

/// "No such record" is an answer, not a failure
fn is_no_records(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// CNAME targets are reported without the root dot
fn trim_root(name: String) -> String {
    match name.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        match self.resolver.ipv4_lookup(name).await {
            Ok(lookup) => Ok(lookup.iter().map(|a| a.0).collect()),
            Err(e) if is_no_records(&e) => Ok(Vec::new()),
            Err(e) => Err(Error::resolution(name, format!("A lookup failed: {}", e))),
        }
    }

    async fn lookup_cname(&self, name: &str) -> Result<Vec<String>> {
        match self.resolver.lookup(name, RecordType::CNAME).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::CNAME(cname) => Some(trim_root(cname.0.to_utf8())),
                    _ => None,
                })
                .collect()),
            Err(e) if is_no_records(&e) => Ok(Vec::new()),
            Err(e) => Err(Error::resolution(name, format!("CNAME lookup failed: {}", e))),
        }
    }

    fn resolver_name(&self) -> &'static str {
        "hickory"
    }
}

/// Factory for creating hickory resolvers
pub struct HickoryResolverFactory;

impl DnsResolverFactory for HickoryResolverFactory {
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn DnsResolver>> {
        Ok(Box::new(HickoryResolver::new(config)?))
    }
}

/// Register the hickory resolver with a registry
pub fn register(registry: &PluginRegistry) {
    registry.register_resolver("hickory", Box::new(HickoryResolverFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_root() {
        assert_eq!(trim_root("example.github.io.".to_string()), "example.github.io");
        assert_eq!(trim_root("example.github.io".to_string()), "example.github.io");
    }

    #[tokio::test]
    async fn test_factory_creation() {
        let registry = PluginRegistry::new();
        register(&registry);
        assert!(registry.has_resolver("hickory"));

        let resolver = registry.create_resolver(&ResolverConfig::default()).unwrap();
        assert_eq!(resolver.resolver_name(), "hickory");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ResolverConfig {
            nameservers: Vec::new(),
            ..ResolverConfig::default()
        };
        assert!(HickoryResolver::new(&config).is_err());
    }
}
