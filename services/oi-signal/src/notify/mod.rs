//! Notification channels

pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::types::{NotificationChannel, Result};
use tracing::info;

/// Writes messages to the log only; used when no chat is configured
#[derive(Debug, Clone)]
pub struct LogNotifier {
    label: &'static str,
}

impl LogNotifier {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for LogNotifier {
    async fn send_text(&self, text: &str) -> Result<()> {
        info!(channel = self.label, message = %text, "notification");
        Ok(())
    }

    fn name(&self) -> &str {
        self.label
    }
}
