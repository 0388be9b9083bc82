//! Message context supplied by the chat platform

/// Reference to a file hosted by the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Platform file identifier
    pub file_id: String,

    /// Size in bytes, if the platform reported it
    pub size: Option<u64>,
}

impl FileRef {
    /// Create a file reference without a known size
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            size: None,
        }
    }
}

/// One incoming chat message, reduced to what the pipeline needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat to reply into
    pub chat_id: i64,

    /// Sender identity as supplied by the platform
    pub sender_id: i64,

    /// Message text or caption
    pub text: Option<String>,

    /// Photo attachment (largest available size)
    pub photo: Option<FileRef>,

    /// Voice note attachment
    pub voice: Option<FileRef>,

    /// Audio file attachment
    pub audio: Option<FileRef>,
}

impl IncomingMessage {
    /// A text-only message
    pub fn text(chat_id: i64, sender_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender_id,
            text: Some(text.into()),
            ..Default::default()
        }
    }
}
