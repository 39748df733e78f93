//! Telegram bot notifier
//!
//! ```http
//! POST <api_base>/bot<token>/sendMessage
//! {"chat_id": "<chat_id>", "text": "🆕 <message>"}
//! ```
//!
//! Messages longer than the bot API limit are cut at a line boundary.

use async_trait::async_trait;
use subwatch_core::traits::{Notifier, NotifierFactory};
use subwatch_core::{ChannelId, Error, NotifierConfig, Result};

/// Bot API limit for one message, in characters
const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram bot notifier
pub struct TelegramNotifier {
    /// Bot token
    /// ⚠️ NEVER log this value
    bot_token: String,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramNotifier {
    /// Create a notifier posting to `chat_id`
    pub fn new(
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let bot_token = bot_token.into();
        let chat_id = chat_id.into();
        if bot_token.is_empty() {
            return Err(Error::config("Telegram bot token cannot be empty"));
        }
        if chat_id.is_empty() {
            return Err(Error::config("Telegram chat ID cannot be empty"));
        }

        Ok(Self {
            bot_token,
            chat_id,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: crate::build_client(ChannelId::Telegram)?,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }

    fn payload(&self, message: &str) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.chat_id,
            "text": fit_message(&format!("🆕 {}", message)),
        })
    }
}

/// Cut `text` to the bot API limit, preferring the last full line
fn fit_message(text: &str) -> String {
    let Some((cut, _)) = text.char_indices().nth(MAX_MESSAGE_CHARS) else {
        return text.to_string();
    };

    // Leave room for the ellipsis line
    let head = &text[..cut];
    let head = head
        .char_indices()
        .nth(MAX_MESSAGE_CHARS - 2)
        .map_or(head, |(idx, _)| &head[..idx]);
    let head = head.rfind('\n').map_or(head, |idx| &head[..idx]);

    format!("{}\n…", head)
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        crate::post_json(
            &self.client,
            ChannelId::Telegram,
            &self.send_url(),
            &self.payload(message),
        )
        .await?;

        tracing::debug!(chat_id = %self.chat_id, "Telegram notification delivered");
        Ok(())
    }

    fn channel(&self) -> ChannelId {
        ChannelId::Telegram
    }
}

/// Factory for creating Telegram notifiers
pub struct TelegramFactory;

impl NotifierFactory for TelegramFactory {
    fn create(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        match config {
            NotifierConfig::Telegram {
                bot_token,
                chat_id,
                api_base,
            } => Ok(Box::new(TelegramNotifier::new(
                bot_token.clone(),
                chat_id.clone(),
                api_base.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for Telegram notifier")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_to_bot_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(serde_json::json!({
                "chat_id": "-1001",
                "text": "🆕 New subdomains found for example.com",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new("123:abc", "-1001", server.uri()).unwrap();

        notifier.send("New subdomains found for example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"ok": false, "error_code": 401})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new("bad", "-1001", server.uri()).unwrap();

        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, Error::NotificationDelivery { .. }));
        assert!(!err.to_string().contains("bad/sendMessage"));
    }

    #[test]
    fn test_long_message_is_cut_at_line() {
        let line = "• some-long-subdomain-name.example.com\n";
        let text = line.repeat(200);
        let fitted = fit_message(&text);

        assert!(fitted.chars().count() <= MAX_MESSAGE_CHARS);
        assert!(fitted.ends_with("example.com\n…"));
        assert_eq!(fit_message("short"), "short");
    }

    #[test]
    fn test_token_not_exposed_in_debug() {
        let notifier =
            TelegramNotifier::new("secret_token_12345", "-1001", "https://api.telegram.org")
                .unwrap();
        let debug_str = format!("{:?}", notifier);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("-1001"));
    }
}
