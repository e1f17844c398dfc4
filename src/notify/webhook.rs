//! Chat-robot webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::Notifier;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    msgtype: &'static str,
    text: TextBody<'a>,
    at: Mentions<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Mentions<'a> {
    at_mobiles: &'a [String],
    is_at_all: bool,
}

/// Posts text messages to a chat robot webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, WebhookError> {
        let url = Url::parse(url)?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }
}

fn normalize(message: &str) -> String {
    message.replace("\r\n", "\n")
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str, mentions: &[String]) {
        let content = normalize(message);
        let body = TextMessage {
            msgtype: "text",
            text: TextBody { content: &content },
            at: Mentions {
                at_mobiles: mentions,
                is_at_all: false,
            },
        };

        match self.http.post(self.url.clone()).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(host = ?self.url.host_str(), "notification delivered");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "notification rejected by webhook");
            }
            Err(e) => {
                warn!(error = %e, "failed to deliver notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_shape() {
        let mentions = vec!["13800000000".to_string()];
        let body = TextMessage {
            msgtype: "text",
            text: TextBody { content: "disk full" },
            at: Mentions { at_mobiles: &mentions, is_at_all: false },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "msgtype": "text",
                "text": {"content": "disk full"},
                "at": {"atMobiles": ["13800000000"], "isAtAll": false}
            })
        );
    }

    #[test]
    fn test_crlf_normalized() {
        assert_eq!(normalize("a\r\nb\nc"), "a\nb\nc");
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(matches!(
            WebhookNotifier::new("not a url", Duration::from_secs(1)),
            Err(WebhookError::Url(_))
        ));
    }
}
