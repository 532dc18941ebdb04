//! Chat channel, delivered through an outbound webhook.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppResult;

#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Returns `Ok(true)` on delivery, `Ok(false)` when the channel is
    /// disabled. Transport failures are `Err` so the queue can retry them.
    async fn send_chat_message(&self, handle: &str, text: &str) -> AppResult<bool>;
}

pub struct WebhookChatService {
    http: reqwest::Client,
    webhook_url: String,
}

impl WebhookChatService {
    pub fn new(webhook_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl ChatSender for WebhookChatService {
    async fn send_chat_message(&self, handle: &str, text: &str) -> AppResult<bool> {
        if self.webhook_url.is_empty() {
            warn!(handle, "chat message skipped, webhook not configured");
            return Ok(false);
        }

        self.http
            .post(&self.webhook_url)
            .json(&json!({ "to": handle, "text": text }))
            .send()
            .await?
            .error_for_status()?;

        info!(handle, "chat message sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn unconfigured_webhook_reports_not_sent() {
        let service = WebhookChatService::new(String::new());
        let sent = service.send_chat_message("5511999990000", "oi").await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn posts_handle_and_text_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({ "to": "5511999990000" }),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let service = WebhookChatService::new(server.uri());
        let sent = service
            .send_chat_message("5511999990000", "Boleto vence amanhã")
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn webhook_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let service = WebhookChatService::new(server.uri());
        assert!(service.send_chat_message("x", "y").await.is_err());
    }
}
