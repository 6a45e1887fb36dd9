//! Telegram Bot API delivery

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::types::{NotificationChannel, Result, SignalError};

/// Sends plain text to one fixed chat
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    label: &'static str,
}

impl TelegramNotifier {
    pub fn new(
        config: &TelegramConfig,
        bot_token: &str,
        chat_id: &str,
        label: &'static str,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SignalError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            label,
        })
    }

    /// Alert channel from config, if token and chat are both set
    pub fn alerts(config: &TelegramConfig) -> Result<Option<Self>> {
        match (&config.bot_token, &config.chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Self::new(config, token, chat, "telegram_alerts").map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Diagnostic channel from config, if token and diagnostic chat are both set
    pub fn diagnostics(config: &TelegramConfig) -> Result<Option<Self>> {
        match (&config.bot_token, &config.diagnostic_chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Self::new(config, token, chat, "telegram_diagnostics").map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for TelegramNotifier {
    async fn send_text(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SignalError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SignalError::Notification(format!(
                "Telegram sendMessage failed: {} - {}",
                status, body
            )));
        }

        debug!(channel = self.label, "Telegram message sent");
        Ok(())
    }

    fn name(&self) -> &str {
        self.label
    }
}
