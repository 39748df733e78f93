//! ThreatMiner passive DNS connector
//!
//! ```http
//! GET /v2/domain.php?q=example.com&rt=5
//! ```
//!
//! ThreatMiner reports "no results" in the body (`status_code: "404"`) with
//! an HTTP 200, so the body status is checked as well.

use async_trait::async_trait;
use serde::Deserialize;
use subwatch_core::config::{HttpConfig, SourceConfig};
use subwatch_core::traits::{SourceConnector, SourceConnectorFactory};
use subwatch_core::{Error, Result};

const SOURCE_NAME: &str = "threatminer";

/// Report type for subdomain enumeration
const RT_SUBDOMAINS: u8 = 5;

#[derive(Debug, Deserialize)]
struct ThreatminerResponse {
    #[serde(default)]
    status_code: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    results: Option<Vec<String>>,
}

/// ThreatMiner source connector
#[derive(Debug)]
pub struct ThreatminerConnector {
    base_url: String,
    client: reqwest::Client,
}

impl ThreatminerConnector {
    /// Create a connector against `base_url`
    pub fn new(base_url: impl Into<String>, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: crate::build_client(SOURCE_NAME, http, false)?,
        })
    }

    fn query_url(&self, domain: &str) -> String {
        format!("{}/v2/domain.php?q={}&rt={}", self.base_url, domain, RT_SUBDOMAINS)
    }
}

fn parse_response(body: &str) -> Result<Vec<String>> {
    let response: ThreatminerResponse = serde_json::from_str(body)
        .map_err(|e| Error::source_unavailable(SOURCE_NAME, format!("Failed to parse response: {}", e)))?;

    match response.status_code.as_deref() {
        None | Some("200") | Some("404") => Ok(response.results.unwrap_or_default()),
        Some(code) => Err(Error::source_unavailable(
            SOURCE_NAME,
            format!(
                "API status {}: {}",
                code,
                response.status_message.unwrap_or_default()
            ),
        )),
    }
}

#[async_trait]
impl SourceConnector for ThreatminerConnector {
    async fn try_fetch(&self, domain: &str) -> Result<Vec<String>> {
        let url = self.query_url(domain);
        tracing::debug!(domain, "Querying ThreatMiner");

        let response = self
            .client
            .get(&url)
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

        let names = parse_response(&body)?;
        tracing::debug!(domain, count = names.len(), "ThreatMiner returned names");
        Ok(names)
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

/// Factory for creating ThreatMiner connectors
pub struct ThreatminerFactory;

impl SourceConnectorFactory for ThreatminerFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn SourceConnector>> {
        match config {
            SourceConfig::Threatminer { base_url, http } => {
                Ok(Box::new(ThreatminerConnector::new(base_url.clone(), http)?))
            }
            _ => Err(Error::config("Invalid config for ThreatMiner source")),
        }
    }
}
