//! Chat-style webhook notifications for purge and configuration events.

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::WebhookSettings;
use crate::domain::types::WebhookEvent;

const BOT_USERNAME: &str = "edgepurge-bot";
const BOT_ICON: &str = ":airplane:";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook transport failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook responded with status {status}")]
    Status { status: u16 },
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
}

/// Posts notifications for the configured subset of events.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Option<Url>,
    events: Vec<WebhookEvent>,
}

impl WebhookNotifier {
    pub fn new(settings: &WebhookSettings) -> Result<Self, WebhookError> {
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.connect_timeout.saturating_mul(5))
            .build()?;
        Ok(Self {
            http,
            url: settings.url.clone(),
            events: settings.notifications.clone(),
        })
    }

    /// Notifier that never sends anything.
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            url: None,
            events: Vec::new(),
        }
    }

    pub fn is_enabled_for(&self, event: WebhookEvent) -> bool {
        self.url.is_some() && self.events.contains(&event)
    }

    /// Send `text` when `event` is enabled. Delivery failures are logged only.
    pub async fn notify(&self, event: WebhookEvent, text: &str) {
        let Some(url) = self.url.as_ref().filter(|_| self.events.contains(&event)) else {
            debug!(event = event.as_str(), "webhook notification skipped");
            return;
        };

        match self.send(url, text).await {
            Ok(()) => debug!(event = event.as_str(), "webhook notification sent"),
            Err(err) => warn!(
                event = event.as_str(),
                error = %err,
                "webhook notification failed"
            ),
        }
    }

    async fn send(&self, url: &Url, text: &str) -> Result<(), WebhookError> {
        let payload = WebhookPayload {
            text,
            username: BOT_USERNAME,
            icon_emoji: BOT_ICON,
        };
        let response = self.http.post(url.clone()).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::MockServer;
    use serde_json::json;

    use super::*;

    fn settings(server: &MockServer, events: Vec<WebhookEvent>) -> WebhookSettings {
        WebhookSettings {
            url: Some(Url::parse(&server.url("/hook")).expect("url")),
            notifications: events,
            connect_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn posts_payload_for_enabled_event() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method("POST").path("/hook").json_body(json!({
                "text": "Purge all on example.com",
                "username": "edgepurge-bot",
                "icon_emoji": ":airplane:"
            }));
            then.status(200);
        });

        let notifier =
            WebhookNotifier::new(&settings(&server, vec![WebhookEvent::PurgeAll])).expect("client");
        notifier
            .notify(WebhookEvent::PurgeAll, "Purge all on example.com")
            .await;
        hook.assert();
    }

    #[tokio::test]
    async fn filtered_event_sends_nothing() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method("POST").path("/hook");
            then.status(200);
        });

        let notifier =
            WebhookNotifier::new(&settings(&server, vec![WebhookEvent::PurgeAll])).expect("client");
        assert!(!notifier.is_enabled_for(WebhookEvent::VclUpdate));
        notifier.notify(WebhookEvent::VclUpdate, "ignored").await;
        hook.assert_calls(0);
    }

    #[tokio::test]
    async fn failing_endpoint_is_swallowed() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method("POST").path("/hook");
            then.status(500);
        });

        let notifier = WebhookNotifier::new(&settings(&server, vec![WebhookEvent::ConfigSave]))
            .expect("client");
        notifier.notify(WebhookEvent::ConfigSave, "changed").await;
        hook.assert();
    }

    #[tokio::test]
    async fn disabled_notifier_is_silent() {
        let notifier = WebhookNotifier::disabled();
        assert!(!notifier.is_enabled_for(WebhookEvent::PurgeKeys));
        notifier.notify(WebhookEvent::PurgeKeys, "nothing").await;
    }
}
