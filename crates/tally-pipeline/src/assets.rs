//! Asset building: chat message content to an ordered asset list

use crate::error::PipelineError;
use tally_domain::traits::ChatPlatform;
use tally_domain::{Asset, AssetKind, FileRef, IncomingMessage, Source};
use tracing::debug;

/// Message content validated for one source kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    /// Raw message text
    Text(String),
    /// Photo attachment
    Photo(FileRef),
    /// Voice note attachment
    Voice(FileRef),
    /// Audio file attachment
    Audio(FileRef),
}

impl SourceInput {
    /// Text input; an absent text is the empty string
    pub fn text(msg: &IncomingMessage) -> Self {
        SourceInput::Text(msg.text.clone().unwrap_or_default())
    }

    /// Photo input, if the message carries one
    pub fn photo(msg: &IncomingMessage) -> Result<Self, PipelineError> {
        msg.photo
            .clone()
            .map(SourceInput::Photo)
            .ok_or_else(|| PipelineError::Validation("No photo found.".to_string()))
    }

    /// Voice input, if the message carries one
    pub fn voice(msg: &IncomingMessage) -> Result<Self, PipelineError> {
        msg.voice
            .clone()
            .map(SourceInput::Voice)
            .ok_or_else(|| PipelineError::Validation("No voice message found.".to_string()))
    }

    /// Audio input, if the message carries one
    pub fn audio(msg: &IncomingMessage) -> Result<Self, PipelineError> {
        msg.audio
            .clone()
            .map(SourceInput::Audio)
            .ok_or_else(|| PipelineError::Validation("No audio found.".to_string()))
    }

    /// Validate the message for the given source kind
    pub fn from_message(source: Source, msg: &IncomingMessage) -> Result<Self, PipelineError> {
        match source {
            Source::Text => Ok(Self::text(msg)),
            Source::Photo => Self::photo(msg),
            Source::Voice => Self::voice(msg),
            Source::Audio => Self::audio(msg),
        }
    }

    /// Source kind of this input
    pub fn source(&self) -> Source {
        match self {
            SourceInput::Text(_) => Source::Text,
            SourceInput::Photo(_) => Source::Photo,
            SourceInput::Voice(_) => Source::Voice,
            SourceInput::Audio(_) => Source::Audio,
        }
    }

    /// Raw text stored with the ledger records
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            SourceInput::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Fetch attachment bytes (one read per attachment) and wrap them as assets
    pub async fn into_assets<C: ChatPlatform>(self, platform: &C) -> Result<Vec<Asset>, PipelineError> {
        let (file, kind, mime, what) = match self {
            SourceInput::Text(text) => return Ok(vec![Asset::text(text)]),
            SourceInput::Photo(file) => (file, AssetKind::Image, "image/jpeg", "photo"),
            SourceInput::Voice(file) => (file, AssetKind::Audio, "audio/ogg", "voice message"),
            SourceInput::Audio(file) => (file, AssetKind::Audio, "audio/mpeg", "audio"),
        };

        let bytes = platform.fetch_file(&file).await.map_err(|e| {
            debug!("Fetching {} {} failed: {}", what, file.file_id, e);
            PipelineError::Retrieval(format!("Failed to read {}.", what))
        })?;

        debug!("Fetched {} bytes of {}", bytes.len(), what);
        Ok(vec![Asset::data(kind, bytes, mime)])
    }
}
