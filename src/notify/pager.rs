use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{truncate_chars, DeliveryReport, Transport};
use crate::config::PagerConfig;

/// Pager messaging API: one JSON POST per message.
#[derive(Clone)]
pub struct PagerTransport {
    api_url: String,
    api_key: Option<String>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    max_chars: usize,
}

#[derive(Serialize)]
struct PagerPayload<'a> {
    to: &'a str,
    message: &'a str,
}

impl PagerTransport {
    pub fn new(cfg: PagerConfig) -> Self {
        Self {
            api_url: cfg.api_url,
            api_key: cfg.api_key,
            client: Client::new(),
            timeout: cfg.timeout,
            max_retries: cfg.retries.max(1),
            max_chars: cfg.max_chars,
        }
    }

    async fn post_once(&self, payload: &PagerPayload<'_>) -> Result<(), String> {
        let mut req = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let rsp = req
            .send()
            .await
            .map_err(|e| format!("pager request failed: {e}"))?;
        let status = rsp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = rsp.text().await.unwrap_or_default();
        Err(format!(
            "pager HTTP {status}: {}",
            truncate_chars(body.trim(), 200)
        ))
    }
}

#[async_trait::async_trait]
impl Transport for PagerTransport {
    async fn send(&self, destination: &str, message: &str) -> DeliveryReport {
        let body = truncate_chars(message, self.max_chars);
        let payload = PagerPayload {
            to: destination,
            message: &body,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.post_once(&payload).await {
                Ok(()) => {
                    tracing::debug!(%destination, attempt, chars = body.chars().count(), "pager accepted message");
                    return DeliveryReport::ok();
                }
                Err(e) if attempt < self.max_retries => {
                    tracing::debug!(%destination, attempt, error = %e, "pager send failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                }
                Err(e) => return DeliveryReport::failed(e),
            }
        }
    }

    fn name(&self) -> &'static str {
        "pager"
    }
}
