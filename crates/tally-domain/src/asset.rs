//! Extraction inputs built from a chat message

/// Broad kind of an asset, as seen by the extraction backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Plain text
    Text,
    /// Still image
    Image,
    /// Voice note or audio file
    Audio,
}

/// Asset content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPayload {
    /// Inline text
    Text(String),
    /// Raw bytes downloaded from the platform
    Bytes(Vec<u8>),
}

/// A single normalized extraction input.
///
/// Assets are built per message and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// What the payload represents
    pub kind: AssetKind,

    /// The content itself
    pub payload: AssetPayload,

    /// MIME type handed to the extraction backend
    pub mime_type: String,
}

impl Asset {
    /// Wrap a piece of text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Text,
            payload: AssetPayload::Text(text.into()),
            mime_type: "text/plain".to_string(),
        }
    }

    /// Wrap binary data with an explicit MIME type
    pub fn data(kind: AssetKind, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            kind,
            payload: AssetPayload::Bytes(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match &self.payload {
            AssetPayload::Text(t) => t.len(),
            AssetPayload::Bytes(b) => b.len(),
        }
    }

    /// True if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
