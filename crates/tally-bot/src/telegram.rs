//! Telegram Bot API client
//!
//! Covers the four calls the bot needs: long-polling for updates, resolving
//! a file id to a download path, downloading the file, and sending messages.

use crate::error::BotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tally_domain::traits::ChatPlatform;
use tally_domain::{FileRef, IncomingMessage};
use tracing::debug;

/// Default Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Extra slack on top of the long-poll timeout before the HTTP call gives up
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Bot API envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T, BotError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(BotError::Telegram(format!(
                "{} failed: {}",
                method,
                self.description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

/// One entry from `getUpdates`
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update identifier
    pub update_id: i64,

    /// New incoming message, if this update carries one
    #[serde(default)]
    pub message: Option<Message>,
}

/// Incoming Telegram message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    /// Message id within the chat
    pub message_id: i64,

    /// Chat the message arrived in
    pub chat: Chat,

    /// Sender, absent for channel posts
    #[serde(default)]
    pub from: Option<User>,

    /// Message text
    #[serde(default)]
    pub text: Option<String>,

    /// Caption attached to media
    #[serde(default)]
    pub caption: Option<String>,

    /// Available photo sizes
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,

    /// Voice note
    #[serde(default)]
    pub voice: Option<MediaFile>,

    /// Audio file
    #[serde(default)]
    pub audio: Option<MediaFile>,
}

/// Chat reference
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: i64,
}

/// Message sender
#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    /// User id
    pub id: i64,
}

/// One size of a photo
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    /// File id for download
    pub file_id: String,
    /// Width in pixels
    #[serde(default)]
    pub width: u32,
    /// Height in pixels
    #[serde(default)]
    pub height: u32,
    /// Size in bytes
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Voice or audio attachment
#[derive(Debug, Clone, Deserialize)]
pub struct MediaFile {
    /// File id for download
    pub file_id: String,
    /// Size in bytes
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl Message {
    /// Text of the message, falling back to the media caption
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// Largest photo size by pixel area
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo
            .as_ref()?
            .iter()
            .max_by_key(|p| (u64::from(p.width) * u64::from(p.height), p.file_size))
    }

    /// Reduce to the platform-neutral message the pipeline consumes
    pub fn to_incoming(&self) -> IncomingMessage {
        IncomingMessage {
            chat_id: self.chat.id,
            sender_id: self.from.as_ref().map(|u| u.id).unwrap_or(self.chat.id),
            text: self.body().map(str::to_string),
            photo: self.largest_photo().map(|p| file_ref(&p.file_id, p.file_size)),
            voice: self.voice.as_ref().map(|f| file_ref(&f.file_id, f.file_size)),
            audio: self.audio.as_ref().map(|f| file_ref(&f.file_id, f.file_size)),
        }
    }
}

fn file_ref(file_id: &str, size: Option<u64>) -> FileRef {
    FileRef {
        file_id: file_id.to_string(),
        size,
    }
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a client for the public Bot API
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    /// Long-poll for updates with id at or above `offset`
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, BotError> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", timeout_secs.to_string())])
            .timeout(Duration::from_secs(timeout_secs) + POLL_GRACE)
            .send()
            .await?;

        let updates = response
            .json::<ApiResponse<Vec<Update>>>()
            .await?
            .into_result("getUpdates")?;

        if !updates.is_empty() {
            debug!("Received {} updates", updates.len());
        }
        Ok(updates)
    }

    /// Resolve a file id and download its contents
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>, BotError> {
        let file = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?
            .json::<ApiResponse<TgFile>>()
            .await?
            .into_result("getFile")?;

        let path = file
            .file_path
            .ok_or_else(|| BotError::Telegram(format!("getFile returned no path for {}", file_id)))?;

        let response = self.client.get(self.file_url(&path)).send().await?;
        if !response.status().is_success() {
            return Err(BotError::Telegram(format!(
                "File download failed with status {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        debug!("Downloaded {} bytes for file {}", bytes.len(), file_id);
        Ok(bytes.to_vec())
    }

    /// Send a message, optionally with a parse mode
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), BotError> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode,
        };

        self.client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .json::<ApiResponse<serde_json::Value>>()
            .await?
            .into_result("sendMessage")?;
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    type Error = BotError;

    async fn fetch_file(&self, file: &FileRef) -> Result<Vec<u8>, Self::Error> {
        self.download(&file.file_id).await
    }

    async fn send_html(&self, chat_id: i64, html: &str) -> Result<(), Self::Error> {
        self.send_message(chat_id, html, Some("HTML")).await
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), Self::Error> {
        self.send_message(chat_id, text, None).await
    }
}
