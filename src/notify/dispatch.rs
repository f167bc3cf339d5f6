use crate::model::NotificationEvent;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::{debug, info};

/// Delivers a computed notification somewhere outside the process.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<()>;
}

/// Writes each event to the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<()> {
        info!(
            transaction_id = %event.transaction_id,
            tier = event.tier.as_str(),
            books = ?event.book_ids,
            message = %event.message,
            "notification"
        );
        Ok(())
    }
}

/// POSTs each event as JSON to a configured endpoint (a mailer relay, chat hook, ...).
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    endpoint: Url,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint).context("invalid webhook URL")?;
        let http = Client::builder()
            .user_agent(concat!("borrowdesk/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, endpoint })
    }

    pub fn build_request(&self, event: &NotificationEvent) -> Result<reqwest::Request> {
        self.http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(event)
            .build()
            .context("failed to build webhook request")
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<()> {
        let request = self.build_request(event)?;
        debug!(url = %request.url(), tier = event.tier.as_str(), "sending notification");
        let resp = self
            .http
            .execute(request)
            .await
            .context("webhook request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("webhook responded {}: {}", status, body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationTier;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    fn sample() -> NotificationEvent {
        NotificationEvent {
            transaction_id: "t1".into(),
            book_ids: vec![101, 102],
            due_date: Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap(),
            message: "Please return the book".into(),
            tier: NotificationTier::Escalation24h,
        }
    }

    #[test]
    fn webhook_request_carries_event_json() {
        let notifier = WebhookNotifier::new("https://hooks.example.com/borrow").unwrap();
        let req = notifier.build_request(&sample()).unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().as_str(), "https://hooks.example.com/borrow");
        assert_eq!(
            req.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        let body: Value =
            serde_json::from_slice(req.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body["transaction_id"], "t1");
        assert_eq!(body["tier"], "escalation_24h");
        assert_eq!(body["book_ids"], serde_json::json!([101, 102]));
    }

    #[test]
    fn rejects_malformed_endpoint() {
        assert!(WebhookNotifier::new("not a url").is_err());
    }

    #[tokio::test]
    async fn log_notifier_accepts_everything() {
        LogNotifier.dispatch(&sample()).await.unwrap();
    }
}
