//! crt.sh certificate transparency connector
//!
//! ```http
//! GET /?q=%25.example.com&output=json
//! ```
//!
//! Each entry's `name_value` may hold several names separated by newlines,
//! and wildcard names are common. Both are left to normalization.

use async_trait::async_trait;
use serde::Deserialize;
use subwatch_core::config::{HttpConfig, SourceConfig};
use subwatch_core::traits::{SourceConnector, SourceConnectorFactory};
use subwatch_core::{Error, Result};

const SOURCE_NAME: &str = "crtsh";

/// One certificate log entry
#[derive(Debug, Deserialize)]
struct CrtshEntry {
    #[serde(default)]
    name_value: Option<String>,
    #[serde(default)]
    common_name: Option<String>,
}

/// crt.sh source connector
#[derive(Debug)]
pub struct CrtshConnector {
    base_url: String,
    client: reqwest::Client,
}

impl CrtshConnector {
    /// Create a connector against `base_url`
    pub fn new(base_url: impl Into<String>, http: &HttpConfig, accept_invalid_certs: bool) -> Result<Self> {
        if accept_invalid_certs {
            tracing::warn!("crt.sh TLS certificate validation is disabled");
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: crate::build_client(SOURCE_NAME, http, accept_invalid_certs)?,
        })
    }

    fn query_url(&self, domain: &str) -> String {
        // %25 is a URL-encoded '%', crt.sh's wildcard
        format!("{}/?q=%25.{}&output=json", self.base_url, domain)
    }
}

/// Extract raw names from a crt.sh JSON payload
fn parse_entries(body: &str) -> Result<Vec<String>> {
    // crt.sh answers an empty body instead of `[]` on some misses
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<CrtshEntry> = serde_json::from_str(body)
        .map_err(|e| Error::source_unavailable(SOURCE_NAME, format!("Failed to parse response: {}", e)))?;

    Ok(entries
        .into_iter()
        .flat_map(|entry| entry.name_value.into_iter().chain(entry.common_name))
        .collect())
}

#[async_trait]
impl SourceConnector for CrtshConnector {
    async fn try_fetch(&self, domain: &str) -> Result<Vec<String>> {
        let url = self.query_url(domain);
        tracing::debug!(domain, "Querying crt.sh");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::source_unavailable(SOURCE_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::source_unavailable(SOURCE_NAME, format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(crate::status_error(SOURCE_NAME, status, &body));
        }

        let names = parse_entries(&body)?;
        tracing::debug!(domain, count = names.len(), "crt.sh returned names");
        Ok(names)
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

/// Factory for creating crt.sh connectors
pub struct CrtshFactory;

impl SourceConnectorFactory for CrtshFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn SourceConnector>> {
        match config {
            SourceConfig::Crtsh {
                base_url,
                accept_invalid_certs,
                http,
            } => Ok(Box::new(CrtshConnector::new(
                base_url.clone(),
                http,
                *accept_invalid_certs,
            )?)),
            _ => Err(Error::config("Invalid config for crt.sh source")),
        }
    }
}
