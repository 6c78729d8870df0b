//! Outbound alert delivery.
//!
//! The engine talks to a [`Notify`] object; [`TelegramNotifier`] is the
//! production implementation, posting `sendMessage` calls to the Bot API.
//! No retries happen here: the engine re-arms undelivered alerts itself.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::NotifyError;

/// Sends one text message to the operator channel.
#[async_trait]
pub trait Notify: Send + Sync {
    /// Deliver `text`; `Err` means the alert was not delivered.
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Telegram Bot API notifier.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Bot API base URL.
    api_url: String,
    /// Bot token from BotFather.
    bot_token: String,
    /// Destination chat.
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a notifier for one bot/chat pair.
    pub fn new(
        http: reqwest::Client,
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Create a notifier from configuration.
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        Self::new(
            http,
            config.telegram_api_url.clone(),
            config.telegram_token.clone(),
            config.telegram_chat_id.clone(),
        )
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        Ok(())
    }
}
