//! Telegram Bot API notifications

use super::{FeedbackKind, FeedbackSink};

use std::time::Duration;
use tracing::{debug, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Posts feedback to a Telegram chat
#[derive(Clone)]
pub struct TelegramFeedback {
    api_base: String,
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramFeedback {
    pub fn new(bot_token: &str, chat_id: &str) -> Self {
        Self::with_api_base(TELEGRAM_API, bot_token, chat_id)
    }

    pub fn with_api_base(api_base: &str, bot_token: &str, chat_id: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn send(&self, text: String) -> Result<(), reqwest::Error> {
        // Token is part of the path; keep it out of logs
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        self.client
            .post(url)
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl FeedbackSink for TelegramFeedback {
    fn notify(&self, kind: FeedbackKind, message: &str) {
        let text = match kind {
            FeedbackKind::Success => format!("✅ {}", message),
            FeedbackKind::Error => format!("⚠️ {}", message),
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available for Telegram notification");
            return;
        };

        let sink = self.clone();
        runtime.spawn(async move {
            match sink.send(text).await {
                Ok(()) => debug!("Telegram notification sent"),
                Err(e) => warn!(
                    status = ?e.status(),
                    "Error sending Telegram notification"
                ),
            }
        });
    }
}
