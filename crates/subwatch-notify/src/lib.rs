// # Notifiers
//
// Notification channels for the subwatch system.
//
// - `slack`: Slack-style incoming webhook
// - `telegram`: Telegram bot `sendMessage`
//
// ## Security Requirements
//
// - Webhook URLs and bot tokens NEVER appear in logs, errors or `Debug`
// - reqwest errors are stripped of their URL before being reported
//
// A notifier performs one delivery per call. Timeouts, fan-out and failure
// isolation are owned by `NotificationFanout`.

mod slack;
mod telegram;

pub use slack::{SlackFactory, SlackNotifier};
pub use telegram::{TelegramFactory, TelegramNotifier};

use std::time::Duration;
use subwatch_core::{ChannelId, Error, PluginRegistry, Result};

/// HTTP timeout for one delivery
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client(channel: ChannelId) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client for {}: {}", channel, e)))
}

/// POST a JSON payload and map the response status
async fn post_json(
    client: &reqwest::Client,
    channel: ChannelId,
    url: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            Error::notification(channel.as_str(), format!("HTTP request failed: {}", e.without_url()))
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    match status.as_u16() {
        429 => Err(Error::rate_limited(format!(
            "{} rate limit exceeded. Status: {}",
            channel, status
        ))),
        401 | 403 | 404 => Err(Error::notification(
            channel.as_str(),
            format!("Rejected (check credentials): {}", status),
        )),
        _ => Err(Error::notification(
            channel.as_str(),
            format!("Delivery failed: {} - {}", status, error_text.trim()),
        )),
    }
}

/// Register both notifiers with a registry
pub fn register(registry: &PluginRegistry) {
    registry.register_notifier(ChannelId::Slack.as_str(), Box::new(SlackFactory));
    registry.register_notifier(ChannelId::Telegram.as_str(), Box::new(TelegramFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use subwatch_core::NotifierConfig;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_register_creates_notifiers() {
        let registry = PluginRegistry::new();
        register(&registry);

        let notifiers = registry
            .create_notifiers(&[
                NotifierConfig::Slack {
                    webhook_url: "https://hooks.slack.com/services/T000/B000/XXXX".to_string(),
                },
                NotifierConfig::Telegram {
                    bot_token: "123:abc".to_string(),
                    chat_id: "-100".to_string(),
                    api_base: "https://api.telegram.org".to_string(),
                },
            ])
            .unwrap();

        let channels: Vec<_> = notifiers.iter().map(|n| n.channel()).collect();
        assert_eq!(channels, vec![ChannelId::Slack, ChannelId::Telegram]);
    }

    #[tokio::test]
    async fn test_rate_limit_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let client = build_client(ChannelId::Slack).unwrap();
        let err = post_json(&client, ChannelId::Slack, &server.uri(), &serde_json::json!({"text": "x"}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_rejection_reports_status_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = build_client(ChannelId::Slack).unwrap();
        let err = post_json(&client, ChannelId::Slack, &server.uri(), &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotificationDelivery { .. }));
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_transport_error_hides_url() {
        // Nothing listens on port 9; the URL carries a fake secret
        let client = build_client(ChannelId::Telegram).unwrap();
        let err = post_json(
            &client,
            ChannelId::Telegram,
            "http://127.0.0.1:9/botSECRET/sendMessage",
            &serde_json::json!({}),
        )
        .await
        .unwrap_err();

        assert!(!err.to_string().contains("SECRET"));
    }
}
