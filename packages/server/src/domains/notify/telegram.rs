use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::json;
use tracing::{debug, error};

use super::{messages, Notice, Notifier};
use crate::kernel::http::HttpRequest;
use crate::kernel::secret::SecretString;
use crate::kernel::transport::ThrottledTransport;

#[derive(Debug, Clone)]
pub struct TelegramOptions {
    pub api_base: String,
    pub bot_token: SecretString,
    pub chat_id: String,
}

/// Sends notices to a Telegram chat through the shared transport.
pub struct TelegramNotifier {
    transport: Arc<ThrottledTransport>,
    options: TelegramOptions,
}

impl TelegramNotifier {
    pub fn new(transport: Arc<ThrottledTransport>, options: TelegramOptions) -> Self {
        Self { transport, options }
    }

    async fn send_text(&self, text: String) {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.options.api_base.trim_end_matches('/'),
            self.options.bot_token.expose()
        );
        let body = json!({
            "chat_id": self.options.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        match self.transport.send(HttpRequest::post_json(url, body)).await {
            Some(response) if response.is_success() => {
                debug!(chat_id = %self.options.chat_id, "notification delivered");
            }
            Some(response) => {
                error!(status = %response.status, body = %response.body, "Telegram rejected notification");
            }
            None => error!("Telegram unreachable, notification dropped"),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notice: Notice) {
        self.send_text(messages::render(&notice, Local::now())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_transport_config, MockHttpClient, MockReply};
    use reqwest::Method;

    #[tokio::test]
    async fn test_posts_html_message_to_chat() {
        let mock = Arc::new(MockHttpClient::new().on(
            Method::POST,
            "https://telegram.test/botT0KEN/sendMessage",
            MockReply::ok(r#"{"ok":true}"#),
        ));
        let transport = Arc::new(ThrottledTransport::new(mock.clone(), fast_transport_config()));
        let notifier = TelegramNotifier::new(
            transport,
            TelegramOptions {
                api_base: "https://telegram.test/".into(),
                bot_token: SecretString::new("T0KEN"),
                chat_id: "-100200".into(),
            },
        );

        notifier.notify(Notice::Log("token refreshed".into())).await;

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        let body = calls[0].json_body().expect("json body");
        assert_eq!(body["chat_id"], "-100200");
        assert_eq!(body["parse_mode"], "HTML");
        assert!(body["text"].as_str().unwrap().contains("token refreshed"));
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_panic() {
        let mock = Arc::new(MockHttpClient::new().on(
            Method::POST,
            "https://telegram.test/",
            MockReply::failure("connection refused"),
        ));
        let transport = Arc::new(ThrottledTransport::new(mock.clone(), fast_transport_config()));
        let notifier = TelegramNotifier::new(
            transport,
            TelegramOptions {
                api_base: "https://telegram.test".into(),
                bot_token: SecretString::new("T"),
                chat_id: "1".into(),
            },
        );

        notifier.notify(Notice::Stopped).await;

        assert_eq!(mock.calls().len(), 3);
    }
}
