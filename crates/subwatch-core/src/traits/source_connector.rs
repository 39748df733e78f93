// # Source Connector Trait
//
// Defines the interface for pulling raw subdomain names from an external
// enumeration source.
//
// ## Implementations
//
// - crt.sh certificate transparency search: `subwatch-sources` crate
// - ThreatMiner passive DNS: `subwatch-sources` crate
//
// ## Usage
//
// ```rust,ignore
// use subwatch_core::SourceConnector;
//
// let connector = /* SourceConnector implementation */;
//
// // Never fails: transport or parse problems yield an empty list
// let names = connector.fetch("example.com").await;
// ```

use async_trait::async_trait;
use tracing::warn;

/// Trait for source connector implementations
///
/// Implementors provide [`try_fetch`](SourceConnector::try_fetch), which may
/// fail. Callers use [`fetch`](SourceConnector::fetch), which degrades any
/// failure to an empty result so one broken source never fails a pipeline.
///
/// # Trust Level: Untrusted
///
/// Connectors talk to third-party services and must be:
/// - **Stateless**: no memory of earlier fetches
/// - **Single-shot**: one logical query per call, no retry loops
/// - **Isolated**: no access to the domain store or other connectors
///
/// Timeouts are applied by the aggregator as well as by the connector's own
/// HTTP client.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Query the source for names under `domain`
    ///
    /// The returned names are raw: they may contain wildcards, mixed case or
    /// several newline-separated names per entry.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<String>)`: Raw names, possibly empty
    /// - `Err(Error)`: Transport, status or payload failure
    async fn try_fetch(&self, domain: &str) -> Result<Vec<String>, crate::Error>;

    /// Query the source, mapping every failure to an empty list
    async fn fetch(&self, domain: &str) -> Vec<String> {
        match self.try_fetch(domain).await {
            Ok(names) => names,
            Err(e) => {
                warn!(source = self.source_name(), domain, "Source fetch failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing source connectors from configuration
pub trait SourceConnectorFactory: Send + Sync {
    /// Create a SourceConnector instance from configuration
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn SourceConnector>, crate::Error>;
}
