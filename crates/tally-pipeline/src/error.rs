//! Error types for the pipeline

use thiserror::Error;

/// Errors that can occur while processing one message.
///
/// The first failure aborts all later stages.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Expected attachment missing for the source kind
    #[error("Validation error: {0}")]
    Validation(String),

    /// Attachment bytes could not be fetched
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Extraction call failed or returned unusable data
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Transactional batch insert failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The reply could not be delivered
    #[error("Reply error: {0}")]
    Reply(String),
}

impl PipelineError {
    /// Name of the failing stage
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Retrieval(_) => "retrieval",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::Reply(_) => "reply",
        }
    }

    /// Plain-text explanation sent back to the user
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Validation(msg) | PipelineError::Retrieval(msg) => msg.clone(),
            PipelineError::Extraction(msg) => format!("Failed to process: {}", msg),
            PipelineError::Persistence(msg) => format!("Failed to save: {}", msg),
            PipelineError::Reply(msg) => format!("Failed to reply: {}", msg),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Extraction(format!("cannot serialize result: {}", e))
    }
}
