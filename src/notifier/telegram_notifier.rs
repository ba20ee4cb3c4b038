//! Telegram Bot API delivery.

use std::time::Duration;

use anyhow::Context;
use anyhow::bail;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use wreq::header::CONTENT_TYPE;

use crate::notifier::Notifier;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Sends Markdown messages through `sendMessage`.
pub struct TelegramNotifier {
    pub api_url: String,
    token: String,
    client: wreq::Client,
}

impl TelegramNotifier {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let client = wreq::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            api_url: TELEGRAM_API_URL.to_string(),
            token: token.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, user_id: i64, text: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": user_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        debug!("Sending Telegram message to {user_id}");
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_url, self.token))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .context("Telegram request failed")?;

        let status = response.status();
        let resp: Value = serde_json::from_str(&response.text().await?)
            .with_context(|| format!("Invalid Telegram response (status {status})"))?;

        if !resp.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let description = resp
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            bail!("Telegram rejected message to {user_id} (status {status}): {description}");
        }
        Ok(())
    }
}
