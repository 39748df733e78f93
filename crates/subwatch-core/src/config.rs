//! Configuration types for the subwatch system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::traits::ChannelId;

/// Main subwatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Enabled subdomain sources
    pub sources: Vec<SourceConfig>,

    /// DNS resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Domain store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Configured notification channels
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl MonitorConfig {
    /// Create a new configuration with defaults
    ///
    /// Both built-in sources are enabled; no notifiers are configured.
    pub fn new() -> Self {
        Self {
            sources: vec![SourceConfig::crtsh(), SourceConfig::threatminer()],
            resolver: ResolverConfig::default(),
            store: StoreConfig::default(),
            notifiers: Vec::new(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sources.is_empty() {
            return Err(crate::Error::config("No sources configured"));
        }

        for source in &self.sources {
            source.validate()?;
        }

        self.resolver.validate()?;
        self.store.validate()?;

        let mut channels = HashSet::new();
        for notifier in &self.notifiers {
            notifier.validate()?;
            if !channels.insert(notifier.channel()) {
                return Err(crate::Error::config(format!(
                    "Notification channel configured twice: {}",
                    notifier.channel()
                )));
            }
        }

        self.engine.validate()?;

        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound HTTP settings shared by source connectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("HTTP timeout must be > 0"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(crate::Error::config("HTTP user agent cannot be empty"));
        }
        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Subdomain source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// crt.sh certificate transparency search
    Crtsh {
        /// Base URL of the crt.sh service
        #[serde(default = "default_crtsh_url")]
        base_url: String,
        /// Skip TLS certificate validation for this endpoint
        #[serde(default)]
        accept_invalid_certs: bool,
        /// HTTP settings
        #[serde(default)]
        http: HttpConfig,
    },

    /// ThreatMiner passive DNS search
    Threatminer {
        /// Base URL of the ThreatMiner API
        #[serde(default = "default_threatminer_url")]
        base_url: String,
        /// HTTP settings
        #[serde(default)]
        http: HttpConfig,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// crt.sh with default settings
    pub fn crtsh() -> Self {
        SourceConfig::Crtsh {
            base_url: default_crtsh_url(),
            accept_invalid_certs: false,
            http: HttpConfig::default(),
        }
    }

    /// ThreatMiner with default settings
    pub fn threatminer() -> Self {
        SourceConfig::Threatminer {
            base_url: default_threatminer_url(),
            http: HttpConfig::default(),
        }
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Crtsh { base_url, http, .. }
            | SourceConfig::Threatminer { base_url, http } => {
                validate_http_url(base_url, self.type_name())?;
                http.validate()
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom source config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Crtsh { .. } => "crtsh",
            SourceConfig::Threatminer { .. } => "threatminer",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// DNS resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Resolver type name (registry key)
    #[serde(default = "default_resolver_type")]
    pub resolver_type: String,

    /// Nameserver addresses to query
    #[serde(default = "default_nameservers")]
    pub nameservers: Vec<IpAddr>,

    /// Per-query timeout in seconds
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Maximum resolutions in flight at once
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl ResolverConfig {
    /// Per-query timeout as a Duration
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.resolver_type.is_empty() {
            return Err(crate::Error::config("Resolver type cannot be empty"));
        }
        if self.nameservers.is_empty() {
            return Err(crate::Error::config("At least one nameserver is required"));
        }
        if self.query_timeout_secs == 0 {
            return Err(crate::Error::config("DNS query timeout must be > 0"));
        }
        if self.max_workers == 0 {
            return Err(crate::Error::config("DNS max workers must be > 0"));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolver_type: default_resolver_type(),
            nameservers: default_nameservers(),
            query_timeout_secs: default_query_timeout_secs(),
            max_workers: default_max_workers(),
        }
    }
}

/// Domain store configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },

    /// PostgreSQL store
    Postgres {
        /// Connection string (may contain credentials)
        url: String,
        /// Maximum pool connections
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("File store path cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Postgres { url, max_connections } => {
                if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                    return Err(crate::Error::config(
                        "Postgres store URL must start with postgres:// or postgresql://",
                    ));
                }
                if *max_connections == 0 {
                    return Err(crate::Error::config("Postgres max connections must be > 0"));
                }
                Ok(())
            }
            StoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom store factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
            StoreConfig::Postgres { .. } => "postgres",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

// Connection strings carry credentials
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreConfig::Memory => f.write_str("Memory"),
            StoreConfig::File { path } => f.debug_struct("File").field("path", path).finish(),
            StoreConfig::Postgres { max_connections, .. } => f
                .debug_struct("Postgres")
                .field("url", &"<REDACTED>")
                .field("max_connections", max_connections)
                .finish(),
            StoreConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// Notification channel configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Slack-style incoming webhook
    Slack {
        /// Webhook URL (secret)
        webhook_url: String,
    },

    /// Telegram bot
    Telegram {
        /// Bot token (secret)
        bot_token: String,
        /// Target chat ID
        chat_id: String,
        /// Bot API base URL
        #[serde(default = "default_telegram_api_url")]
        api_base: String,
    },
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Slack { webhook_url } => {
                if webhook_url.is_empty() {
                    return Err(crate::Error::config("Slack webhook URL cannot be empty"));
                }
                validate_http_url(webhook_url, "slack")
            }
            NotifierConfig::Telegram {
                bot_token,
                chat_id,
                api_base,
            } => {
                if bot_token.is_empty() {
                    return Err(crate::Error::config("Telegram bot token cannot be empty"));
                }
                if chat_id.is_empty() {
                    return Err(crate::Error::config("Telegram chat ID cannot be empty"));
                }
                validate_http_url(api_base, "telegram")
            }
        }
    }

    /// The channel this configuration delivers to
    pub fn channel(&self) -> ChannelId {
        match self {
            NotifierConfig::Slack { .. } => ChannelId::Slack,
            NotifierConfig::Telegram { .. } => ChannelId::Telegram,
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &'static str {
        self.channel().as_str()
    }
}

// Webhook URLs and bot tokens are secrets
impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierConfig::Slack { .. } => f
                .debug_struct("Slack")
                .field("webhook_url", &"<REDACTED>")
                .finish(),
            NotifierConfig::Telegram { chat_id, api_base, .. } => f
                .debug_struct("Telegram")
                .field("bot_token", &"<REDACTED>")
                .field("chat_id", chat_id)
                .field("api_base", api_base)
                .finish(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between scheduled sweeps (in seconds)
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    /// Maximum domains monitored concurrently in one sweep
    #[serde(default = "default_max_concurrent_domains")]
    pub max_concurrent_domains: usize,

    /// Upper bound for one connector fetch (in seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Upper bound for one notification delivery (in seconds)
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,

    /// Notify about the initial subdomains of a newly created domain
    ///
    /// Off by default: a first discovery usually reports every historical
    /// certificate name, which is not news.
    #[serde(default)]
    pub notify_on_create: bool,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.monitor_interval_secs == 0 {
            return Err(crate::Error::config("Monitor interval must be > 0"));
        }
        if self.max_concurrent_domains == 0 {
            return Err(crate::Error::config("Max concurrent domains must be > 0"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(crate::Error::config("Fetch timeout must be > 0"));
        }
        if self.notify_timeout_secs == 0 {
            return Err(crate::Error::config("Notify timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_monitor_interval_secs(),
            max_concurrent_domains: default_max_concurrent_domains(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            notify_timeout_secs: default_notify_timeout_secs(),
            notify_on_create: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn validate_http_url(url: &str, owner: &str) -> Result<(), crate::Error> {
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "{} URL must use HTTP or HTTPS scheme",
            owner
        )));
    }
    Ok(())
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("subwatch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_crtsh_url() -> String {
    "https://crt.sh".to_string()
}

fn default_threatminer_url() -> String {
    "https://api.threatminer.org".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_resolver_type() -> String {
    "hickory".to_string()
}

fn default_nameservers() -> Vec<IpAddr> {
    vec![
        IpAddr::from([1, 1, 1, 1]),
        IpAddr::from([1, 0, 0, 1]),
        IpAddr::from([8, 8, 8, 8]),
        IpAddr::from([8, 8, 4, 4]),
    ]
}

fn default_query_timeout_secs() -> u64 {
    5
}

fn default_max_workers() -> usize {
    10
}

fn default_max_connections() -> u32 {
    5
}

fn default_monitor_interval_secs() -> u64 {
    3600
}

fn default_max_concurrent_domains() -> usize {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_notify_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}
