//! Outbound order notifications through the Telegram Bot API.
//!
//! Credentials live in system settings, not in the process configuration, so
//! the notifier only owns the HTTP client and the API base URL. Every call is
//! a single attempt; callers treat failures as soft.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;
use thiserror::Error;

const USER_AGENT: &str = concat!("storefront-api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid notification endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Bot token and destination chat read from system settings.
#[derive(Debug, Clone)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramCredentials {
    /// Both values must be present and non-blank.
    pub fn from_parts(bot_token: Option<String>, chat_id: Option<String>) -> Option<Self> {
        let bot_token = bot_token.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())?;
        let chat_id = chat_id.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())?;
        Some(Self { bot_token, chat_id })
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: Url,
}

impl TelegramNotifier {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| anyhow::anyhow!("invalid Telegram API base '{base_url}': {e}"))?;

        Ok(Self { client, base_url })
    }

    pub async fn send_message(
        &self,
        credentials: &TelegramCredentials,
        text: &str,
    ) -> Result<(), NotifyError> {
        // Bot tokens contain ':', so `Url::join` would read the prefix as a scheme.
        let url = Url::parse(&format!(
            "{}bot{}/sendMessage",
            self.base_url, credentials.bot_token
        ))
        .map_err(|e| NotifyError::InvalidEndpoint(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &credentials.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TelegramCredentials;

    #[test]
    fn credentials_require_both_values() {
        assert!(TelegramCredentials::from_parts(None, Some("1".into())).is_none());
        assert!(TelegramCredentials::from_parts(Some("t".into()), None).is_none());
        assert!(TelegramCredentials::from_parts(Some("  ".into()), Some("1".into())).is_none());

        let creds = TelegramCredentials::from_parts(Some(" t ".into()), Some("-100".into()))
            .expect("credentials");
        assert_eq!(creds.bot_token, "t");
        assert_eq!(creds.chat_id, "-100");
    }
}
