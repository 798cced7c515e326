use std::collections::BTreeMap;
use std::time::Duration;

use irs_core::error::AppError;
use irs_core::notify::Notifier;
use serde::{Deserialize, Serialize};

/// Publishes notifications as a JSON POST. The receiver's `messageId` is used when present,
/// otherwise a local id is minted.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct PublishRequest<'a> {
    subject: &'a str,
    body: &'a str,
    attributes: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PublishResponse {
    message_id: Option<String>,
}

impl Notifier for WebhookNotifier {
    fn publish(
        &self,
        subject: &str,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String, AppError> {
        let req = PublishRequest {
            subject,
            body,
            attributes,
        };
        let payload = serde_json::to_value(req).map_err(|e| {
            AppError::new("NOTIFY_PUBLISH_FAILED", "Failed to encode notification").with_details(e.to_string())
        })?;

        match ureq::post(&self.url).timeout(self.timeout).send_json(payload) {
            Ok(r) if (200..300).contains(&r.status()) => {
                let parsed: PublishResponse = r.into_json().unwrap_or_default();
                Ok(parsed
                    .message_id
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| format!("msg-{}", ulid::Ulid::new())))
            }
            Ok(r) => Err(AppError::new("NOTIFY_PUBLISH_FAILED", "Notification endpoint rejected the message")
                .with_details(format!("status={}", r.status()))),
            Err(ureq::Error::Status(code, _)) => {
                Err(AppError::new("NOTIFY_PUBLISH_FAILED", "Notification endpoint rejected the message")
                    .with_details(format!("status={code}")))
            }
            Err(e) => Err(AppError::unavailable("NOTIFY_UNAVAILABLE", "Failed to reach notification endpoint")
                .with_details(format!("url={}; err={e}", self.url))),
        }
    }
}
