//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the pipeline and
//! infrastructure. Implementations live in other crates.

use crate::{Asset, ExtractionResult, FieldBindings, FileRef, LedgerRecord};
use async_trait::async_trait;

/// Trait for the external extraction capability
///
/// Implemented by the infrastructure layer (tally-llm)
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Error type for extraction calls
    type Error: std::fmt::Display + Send;

    /// Derive structured expense data from an ordered asset list.
    ///
    /// Either the whole result is returned or a single error; partial field
    /// results are never surfaced.
    async fn extract(
        &self,
        assets: &[Asset],
        bindings: &FieldBindings,
    ) -> Result<ExtractionResult, Self::Error>;
}

/// Trait for the append-only expense ledger
///
/// Implemented by the infrastructure layer (tally-store)
pub trait LedgerStore {
    /// Error type for store operations
    type Error;

    /// Insert every record of one extraction event atomically.
    ///
    /// Returns the number of rows written. On error no record of the batch
    /// survives.
    fn insert_batch(&mut self, records: &[LedgerRecord]) -> Result<usize, Self::Error>;

    /// Records whose id starts with the given correlation id, in id order
    fn records_with_prefix(&self, correlation: &str) -> Result<Vec<LedgerRecord>, Self::Error>;

    /// All records of one user, oldest first
    fn records_for_user(&self, user_id: i64) -> Result<Vec<LedgerRecord>, Self::Error>;

    /// Total number of records
    fn count(&self) -> Result<usize, Self::Error>;
}

/// Trait for the messaging platform a message arrived on
///
/// Implemented by the host (tally-bot)
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Error type for platform calls
    type Error: std::fmt::Display + Send;

    /// Download the raw bytes of an attachment
    async fn fetch_file(&self, file: &FileRef) -> Result<Vec<u8>, Self::Error>;

    /// Send a rich-text (HTML) message
    async fn send_html(&self, chat_id: i64, html: &str) -> Result<(), Self::Error>;

    /// Send a plain-text message
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), Self::Error>;
}
