//! Notification fan-out
//!
//! Formats one alert per batch and delivers it to every requested channel
//! that has a configured notifier. Delivery problems are logged and reported,
//! never propagated.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::traits::{ChannelId, DnsRecord, Notifier};

/// Per-channel delivery outcome of one `notify` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReport {
    /// Channels that accepted the message
    pub delivered: Vec<ChannelId>,
    /// Channels that failed, with the error text
    pub failed: Vec<(ChannelId, String)>,
    /// Requested channels with no configured notifier
    pub skipped: Vec<ChannelId>,
}

impl NotifyReport {
    /// Whether no delivery was attempted
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Delivers alerts to notification channels
#[derive(Clone)]
pub struct NotificationFanout {
    notifiers: HashMap<ChannelId, Arc<dyn Notifier>>,
    send_timeout: Duration,
}

impl NotificationFanout {
    /// Create a fan-out over `notifiers`
    ///
    /// When two notifiers share a channel, the last one wins.
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>, send_timeout: Duration) -> Self {
        let notifiers = notifiers
            .into_iter()
            .map(|notifier| (notifier.channel(), notifier))
            .collect();
        Self {
            notifiers,
            send_timeout,
        }
    }

    /// Channels with a configured notifier
    pub fn configured_channels(&self) -> BTreeSet<ChannelId> {
        self.notifiers.keys().copied().collect()
    }

    /// Send one message about `records` to each channel in `channels`
    ///
    /// Channels are delivered concurrently. An empty `records` slice sends
    /// nothing.
    pub async fn notify(
        &self,
        domain: &str,
        records: &[DnsRecord],
        channels: &BTreeSet<ChannelId>,
    ) -> NotifyReport {
        let mut report = NotifyReport::default();

        if records.is_empty() || channels.is_empty() {
            debug!(domain, "Nothing to notify");
            return report;
        }

        let message = format_message(domain, records);

        let mut sends = Vec::new();
        for channel in channels {
            match self.notifiers.get(channel) {
                Some(notifier) => {
                    let notifier = Arc::clone(notifier);
                    let message = message.as_str();
                    sends.push(async move {
                        let result =
                            tokio::time::timeout(self.send_timeout, notifier.send(message)).await;
                        (notifier.channel(), result)
                    });
                }
                None => {
                    debug!(domain, channel = %channel, "Channel not configured, skipping");
                    report.skipped.push(*channel);
                }
            }
        }

        for (channel, result) in join_all(sends).await {
            match result {
                Ok(Ok(())) => {
                    info!(domain, channel = %channel, records = records.len(), "Notification delivered");
                    report.delivered.push(channel);
                }
                Ok(Err(e)) => {
                    warn!(domain, channel = %channel, "Notification failed: {}", e);
                    report.failed.push((channel, e.to_string()));
                }
                Err(_) => {
                    warn!(domain, channel = %channel, "Notification timed out after {:?}", self.send_timeout);
                    report
                        .failed
                        .push((channel, format!("timed out after {:?}", self.send_timeout)));
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for NotificationFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationFanout")
            .field("channels", &self.configured_channels())
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

/// Render the alert body for `records`
///
/// Records are listed in name order. Channel-specific prefixes are added by
/// the notifiers.
pub fn format_message(domain: &str, records: &[DnsRecord]) -> String {
    let mut sorted: Vec<&DnsRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));

    let mut message = format!("New subdomains found for {}\n\n", domain);
    for record in sorted {
        let _ = writeln!(message, "• {}", record.subdomain);
        if !record.a.is_empty() {
            let addrs: Vec<String> = record.a.iter().map(|ip| ip.to_string()).collect();
            let _ = writeln!(message, "  A: {}", addrs.join(", "));
        }
        if !record.cname.is_empty() {
            let _ = writeln!(message, "  CNAME: {}", record.cname.join(", "));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_format_message() {
        let records = vec![
            DnsRecord {
                subdomain: "www.example.com".to_string(),
                a: Vec::new(),
                cname: vec!["example.github.io".to_string()],
            },
            DnsRecord {
                subdomain: "api.example.com".to_string(),
                a: vec![Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)],
                cname: Vec::new(),
            },
        ];

        let message = format_message("example.com", &records);
        assert_eq!(
            message,
            "New subdomains found for example.com\n\n\
             • api.example.com\n  A: 192.0.2.1, 192.0.2.2\n\
             • www.example.com\n  CNAME: example.github.io\n"
        );
    }

    #[tokio::test]
    async fn test_empty_records_send_nothing() {
        let fanout = NotificationFanout::new(Vec::new(), Duration::from_secs(1));
        let channels: BTreeSet<_> = [ChannelId::Slack].into_iter().collect();

        let report = fanout.notify("example.com", &[], &channels).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_channel_skipped() {
        let fanout = NotificationFanout::new(Vec::new(), Duration::from_secs(1));
        let channels: BTreeSet<_> = [ChannelId::Telegram].into_iter().collect();

        let report = fanout
            .notify("example.com", &[DnsRecord::new("a.example.com")], &channels)
            .await;
        assert_eq!(report.skipped, vec![ChannelId::Telegram]);
        assert!(report.delivered.is_empty());
    }
}
