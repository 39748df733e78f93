// # Notifier Trait
//
// Defines the interface for delivering one formatted message to one
// notification channel.
//
// ## Implementations
//
// - Slack incoming webhook: `subwatch-notify` crate
// - Telegram bot API: `subwatch-notify` crate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Notification channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    /// Slack-style incoming webhook
    Slack,
    /// Telegram bot chat
    Telegram,
}

impl ChannelId {
    /// Stable lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Slack => "slack",
            ChannelId::Telegram => "telegram",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slack" => Ok(ChannelId::Slack),
            "telegram" => Ok(ChannelId::Telegram),
            other => Err(crate::Error::invalid_input(format!(
                "Unknown notification channel: {}",
                other
            ))),
        }
    }
}

/// Trait for notifier implementations
///
/// # Trust Level: Untrusted
///
/// A notifier performs exactly one delivery per call and reports the outcome.
/// It never retries, never batches and never decides who gets notified; those
/// belong to `NotificationFanout`.
///
/// # Security
///
/// Implementations must keep tokens and webhook URLs out of logs, errors and
/// `Debug` output.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Delivery accepted (2xx)
    /// - `Err(Error)`: Rejected, rate limited or transport failure
    async fn send(&self, message: &str) -> Result<(), crate::Error>;

    /// The channel this notifier delivers to
    fn channel(&self) -> ChannelId;
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a Notifier instance from configuration
    fn create(
        &self,
        config: &crate::config::NotifierConfig,
    ) -> Result<Box<dyn Notifier>, crate::Error>;
}
