//! Delivers rendered messages to the discord webhook.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{alert::AlertStatus, discord::Message};

/// Error occurring while delivering a [Message]
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("failed to reach discord webhook")]
    Transport(#[from] reqwest::Error),
}

/// Client for a single discord webhook
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    url: Url,
}

impl WebhookClient {
    /// # Arguments
    ///
    /// * `url` - the webhook messages are posted to
    ///
    /// * `timeout` - upper bound for a whole delivery, including reading the response
    pub fn new(url: Url, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, url })
    }

    /// Posts `message` to the webhook. Discord answers successful executions
    /// with an empty body, anything it does send back gets logged.
    pub async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(message)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = %status, body = %body, "discord webhook rejected message");
        } else if !body.is_empty() {
            info!("{}", body);
        }

        Ok(())
    }

    /// Sends every message in order. A failed delivery doesn't stop the
    /// remaining ones, the number of failed deliveries is returned.
    pub async fn send_all(&self, messages: &[(AlertStatus, Message)]) -> usize {
        let mut failed = 0;

        for (status, message) in messages {
            if let Err(err) = self.send(message).await {
                tracing::error!(status = status.as_str(), "failed to deliver alerts: {:#}", anyhow::Error::from(err));
                failed += 1;
            }
        }

        failed
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::renderer;

    fn client(server: &MockServer) -> WebhookClient {
        let url = Url::parse(&format!("{}/api/webhooks/123/token", server.uri())).unwrap();
        WebhookClient::new(url, Duration::from_secs(5)).unwrap()
    }

    /// nothing listens on port 1
    fn unreachable() -> WebhookClient {
        let url = Url::parse("http://127.0.0.1:1/api/webhooks/123/token").unwrap();
        WebhookClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn posts_json_message() {
        let server = MockServer::start().await;
        let message = renderer::misconfiguration_notice();

        Mock::given(method("POST"))
            .and(path("/api/webhooks/123/token"))
            .and(header("content-type", "application/json"))
            .and(body_json(&message))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).send(&message).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_not_a_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"message\": \"Invalid Form Body\"}"))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .send(&renderer::misconfiguration_notice())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_webhook_is_a_transport_error() {
        let client = unreachable();

        let result = client.send(&renderer::misconfiguration_notice()).await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }

    #[tokio::test]
    async fn slow_webhook_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let client = WebhookClient::new(url, Duration::from_millis(100)).unwrap();

        let result = client.send(&renderer::misconfiguration_notice()).await;
        assert!(matches!(result, Err(DeliveryError::Transport(err)) if err.is_timeout()));
    }

    #[tokio::test]
    async fn send_all_continues_after_failure() {
        let client = unreachable();

        let message = renderer::misconfiguration_notice();
        let messages = [
            (AlertStatus::Firing, message.clone()),
            (AlertStatus::Resolved, message),
        ];
        let failed = client.send_all(&messages).await;

        assert_eq!(failed, 2);
    }
}
