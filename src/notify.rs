//! Notifier collaborator.
//!
//! Delivers human-readable events to the operator. Fire-and-forget:
//! delivery failures are logged and never propagated, so a broken
//! notification channel cannot take down trading or monitoring.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Deadline for a single notification delivery.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to a recipient. Must not fail the caller.
    async fn notify(&self, recipient: &str, message: &str);
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

/// Telegram Bot API notifier (`sendMessage`).
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self { client, bot_token })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, recipient: &str, message: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = json!({ "chat_id": recipient, "text": message });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(recipient, "Notification delivered");
            }
            Ok(response) => {
                warn!(recipient, status = %response.status(), "Notification rejected");
            }
            Err(e) => {
                warn!(recipient, error = %e, "Notification delivery failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Log fallback
// ---------------------------------------------------------------------------

/// Fallback notifier used when no Telegram credentials are configured:
/// events land in the structured log instead of a chat.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, message: &str) {
        tracing::info!(recipient, message, "Notification");
    }
}
