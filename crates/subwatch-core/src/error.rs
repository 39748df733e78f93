//! Error types for the subwatch system
//!
//! Only some of these ever cross a component boundary. Source and resolution
//! failures are recovered where they happen; storage failures and duplicate
//! domains are surfaced to the caller.

use thiserror::Error;

/// Result type alias for subwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the subwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// A source connector could not produce results
    #[error("Source unavailable ({source_name}): {message}")]
    SourceUnavailable {
        /// Connector name
        source_name: String,
        /// Error message
        message: String,
    },

    /// DNS resolution failed for one name
    #[error("Resolution failed for {name}: {message}")]
    ResolutionFailure {
        /// The name being resolved
        name: String,
        /// Error message
        message: String,
    },

    /// Persistence transport failure
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Domain is already monitored
    #[error("Domain already exists: {0}")]
    DuplicateDomain(String),

    /// Domain is not monitored
    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    /// A notification channel rejected or failed a delivery
    #[error("Notification delivery failed ({channel}): {message}")]
    NotificationDelivery {
        /// Channel identifier
        channel: String,
        /// Error message
        message: String,
    },

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a source error
    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResolutionFailure {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Create a duplicate domain error
    pub fn duplicate_domain(domain: impl Into<String>) -> Self {
        Self::DuplicateDomain(domain.into())
    }

    /// Create a "domain not found" error
    pub fn domain_not_found(domain: impl Into<String>) -> Self {
        Self::DomainNotFound(domain.into())
    }

    /// Create a notification delivery error
    pub fn notification(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotificationDelivery {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error is a storage transport failure
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}
