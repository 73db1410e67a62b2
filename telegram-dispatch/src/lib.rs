//! Delivers downloaded media to a Telegram channel through the Bot API.

use async_trait::async_trait;
use relay_core::{CoreError, DeliveryError, Dispatcher, MediaKind};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram's limit for media captions, in characters.
pub const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Cuts a caption to Telegram's limit, marking the cut with an ellipsis.
pub fn truncate_caption(caption: &str) -> String {
    if caption.chars().count() <= CAPTION_LIMIT {
        return caption.to_string();
    }
    let mut truncated: String = caption.chars().take(CAPTION_LIMIT - 1).collect();
    truncated.push('…');
    truncated
}

fn endpoint_for(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Image => ("sendPhoto", "photo"),
        MediaKind::Video => ("sendVideo", "video"),
    }
}

pub struct TelegramDispatcher {
    http_client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramDispatcher {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self, CoreError> {
        Self::with_base_url(bot_token, chat_id, TELEGRAM_API_BASE.to_string())
    }

    pub fn with_base_url(
        bot_token: String,
        chat_id: String,
        api_base: String,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[async_trait]
impl Dispatcher for TelegramDispatcher {
    async fn deliver(&self, path: &Path, kind: MediaKind, caption: &str) -> Result<(), CoreError> {
        let (method, field) = endpoint_for(kind);
        info!("Attempting to send {:?} to Telegram - Path: {}", kind, path.display());

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| DeliveryError::FileUnreadable {
                path: path.display().to_string(),
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| field.to_string());

        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", truncate_caption(caption))
            .part(field, Part::bytes(bytes).file_name(file_name));
        if kind == MediaKind::Video {
            form = form.text("supports_streaming", "true");
        }

        // Errors carry the request URL, which contains the bot token
        let response = self
            .http_client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.without_url()))?;

        let status = response.status();
        let body = response.json::<ApiResponse>().await;

        match body {
            Ok(reply) if reply.ok && status.is_success() => {
                info!("Successfully sent {:?} to Telegram", kind);
                Ok(())
            }
            Ok(reply)
                if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() =>
            {
                let description = reply
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
                error!("Failed to send {:?} to Telegram: {}", kind, description);
                Err(DeliveryError::Rejected { description }.into())
            }
            _ => {
                error!("Failed to send {:?} to Telegram: HTTP {}", kind, status);
                Err(DeliveryError::HttpStatus {
                    status_code: status.as_u16(),
                }
                .into())
            }
        }
    }
}
