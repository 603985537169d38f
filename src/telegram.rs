use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Telegram API error: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, DeliveryError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(DeliveryError::Api(
                self.description
                    .unwrap_or_else(|| "no description".to_string()),
            )),
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Something that can deliver a text message to a chat
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;
}

/// Minimal Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(base_url: String, token: String, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
            request_timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url.trim_end_matches('/'),
            self.token,
            method
        )
    }

    /// Long-poll for updates with `update_id >= offset`
    #[instrument(skip(self))]
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, DeliveryError> {
        let mut query = vec![("timeout", timeout_secs.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response: ApiResponse<Vec<Update>> = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(self.request_timeout + Duration::from_secs(timeout_secs))
            .send()
            .await?
            .json()
            .await?;

        let updates = response.into_result()?;
        if !updates.is_empty() {
            debug!("Received {} updates", updates.len());
        }
        Ok(updates)
    }

    #[instrument(skip(self, png), fields(png_size = png.len()))]
    pub async fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let part = Part::bytes(png)
            .file_name(filename.to_string())
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);

        let response: ApiResponse<Message> = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .timeout(self.request_timeout)
            .send()
            .await?
            .json()
            .await?;

        response.into_result().map(|_| ()).map_err(|e| {
            warn!("sendPhoto to chat {} rejected: {}", chat_id, e);
            e
        })
    }
}

#[async_trait]
impl MessageSink for TelegramClient {
    #[instrument(skip(self, text))]
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let response: ApiResponse<Message> = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text })
            .timeout(self.request_timeout)
            .send()
            .await?
            .json()
            .await?;

        response.into_result().map(|_| ()).map_err(|e| {
            warn!("sendMessage to chat {} rejected: {}", chat_id, e);
            e
        })
    }
}
