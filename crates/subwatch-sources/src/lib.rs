// # Subdomain Sources
//
// HTTP source connectors for the subwatch system.
//
// ## Sources
//
// - `crtsh`: certificate transparency search at crt.sh
// - `threatminer`: ThreatMiner passive DNS (`rt=5`, subdomains)
//
// ## Architectural Constraints
//
// Connectors are untrusted components:
//
// - ✅ One HTTP request per fetch, to their own endpoint only
// - ✅ Parse source-specific payloads into raw names
// - ❌ No retries, no caching, no background tasks
// - ❌ No normalization (owned by `SourceAggregator`)
//
// Every failure is returned as an error from `try_fetch`; the default
// `fetch` turns it into an empty result.

mod crtsh;
mod threatminer;

pub use crtsh::{CrtshConnector, CrtshFactory};
pub use threatminer::{ThreatminerConnector, ThreatminerFactory};

use subwatch_core::config::HttpConfig;
use subwatch_core::{Error, PluginRegistry, Result};

/// Build the HTTP client shared by a connector's requests
fn build_client(
    source: &'static str,
    http: &HttpConfig,
    accept_invalid_certs: bool,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(http.timeout())
        .user_agent(http.user_agent.as_str())
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client for {}: {}", source, e)))
}

/// Map a non-success HTTP status to an error
fn status_error(source: &'static str, status: reqwest::StatusCode, body: &str) -> Error {
    match status.as_u16() {
        429 => Error::rate_limited(format!("{} rate limit exceeded. Status: {}", source, status)),
        500..=599 => Error::source_unavailable(
            source,
            format!("Server error (transient): {} - {}", status, truncate(body)),
        ),
        _ => Error::source_unavailable(
            source,
            format!("Request failed: {} - {}", status, truncate(body)),
        ),
    }
}

/// Keep error bodies readable in logs
fn truncate(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Register both built-in sources with a registry
///
/// # Example
///
/// ```rust
/// use subwatch_core::PluginRegistry;
///
/// let registry = PluginRegistry::new();
/// subwatch_sources::register(&registry);
/// assert!(registry.has_source("crtsh"));
/// ```
pub fn register(registry: &PluginRegistry) {
    registry.register_source("crtsh", Box::new(CrtshFactory));
    registry.register_source("threatminer", Box::new(ThreatminerFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use subwatch_core::config::SourceConfig;

    #[test]
    fn test_register_creates_configured_sources() {
        let registry = PluginRegistry::new();
        register(&registry);

        let sources = registry
            .create_sources(&[SourceConfig::crtsh(), SourceConfig::threatminer()])
            .unwrap();

        let names: Vec<_> = sources.iter().map(|s| s.source_name()).collect();
        assert_eq!(names, vec!["crtsh", "threatminer"]);
    }

    #[test]
    fn test_status_mapping() {
        let err = status_error("crtsh", reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, Error::RateLimited(_)));

        let err = status_error("crtsh", reqwest::StatusCode::BAD_GATEWAY, "upstream");
        assert!(err.to_string().contains("transient"));

        let err = status_error("threatminer", reqwest::StatusCode::FORBIDDEN, "");
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(1000);
        assert_eq!(truncate(&body).len(), 200);
        assert_eq!(truncate("  short \n"), "short");
    }
}
