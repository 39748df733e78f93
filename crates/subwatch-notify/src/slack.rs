//! Slack incoming webhook notifier
//!
//! ```http
//! POST <webhook_url>
//! {"text": ":new: <message>"}
//! ```

use async_trait::async_trait;
use subwatch_core::traits::{Notifier, NotifierFactory};
use subwatch_core::{ChannelId, Error, NotifierConfig, Result};

/// Slack webhook notifier
pub struct SlackNotifier {
    /// Webhook URL
    /// ⚠️ NEVER log this value
    webhook_url: String,
    client: reqwest::Client,
}

// The webhook URL is a bearer credential
impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("webhook_url", &"<REDACTED>")
            .finish()
    }
}

impl SlackNotifier {
    /// Create a notifier for `webhook_url`
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let webhook_url = webhook_url.into();
        if webhook_url.is_empty() {
            return Err(Error::config("Slack webhook URL cannot be empty"));
        }

        Ok(Self {
            webhook_url,
            client: crate::build_client(ChannelId::Slack)?,
        })
    }

    fn payload(message: &str) -> serde_json::Value {
        serde_json::json!({ "text": format!(":new: {}", message) })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        crate::post_json(
            &self.client,
            ChannelId::Slack,
            &self.webhook_url,
            &Self::payload(message),
        )
        .await?;

        tracing::debug!("Slack notification delivered");
        Ok(())
    }

    fn channel(&self) -> ChannelId {
        ChannelId::Slack
    }
}

/// Factory for creating Slack notifiers
pub struct SlackFactory;

impl NotifierFactory for SlackFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match config {
            NotifierConfig::Slack { webhook_url } => {
                Ok(Box::new(SlackNotifier::new(webhook_url.clone())?))
            }
            _ => Err(Error::config("Invalid config for Slack notifier")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/T000/B000/XXXX"))
            .and(body_json(serde_json::json!({
                "text": ":new: New subdomains found for example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            SlackNotifier::new(format!("{}/services/T000/B000/XXXX", server.uri())).unwrap();

        notifier
            .send("New subdomains found for example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(server.uri()).unwrap();

        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, Error::NotificationDelivery { .. }));
    }

    #[test]
    fn test_webhook_not_exposed_in_debug() {
        let notifier = SlackNotifier::new("https://hooks.slack.com/services/SECRET").unwrap();
        let debug_str = format!("{:?}", notifier);
        assert!(!debug_str.contains("SECRET"));
        assert!(debug_str.contains("SlackNotifier"));
    }

    #[test]
    fn test_factory_rejects_empty_url() {
        let config = NotifierConfig::Slack {
            webhook_url: String::new(),
        };
        assert!(SlackFactory.create(&config).is_err());
    }
}
