//! Ledger records - the durable, item-level expense rows

use chrono::{DateTime, Utc};
use std::fmt;

/// Item name used when an extraction event yields no positions
pub const UNKNOWN_ITEM: &str = "Unknown item";

/// Kind of chat message a record was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Plain text message
    Text,
    /// Photo of a receipt
    Photo,
    /// Voice note
    Voice,
    /// Audio file
    Audio,
}

impl Source {
    /// Get the source name as stored in the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Text => "text",
            Source::Photo => "photo",
            Source::Voice => "voice",
            Source::Audio => "audio",
        }
    }

    /// Parse a source from its stored name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Source::Text),
            "photo" => Some(Source::Photo),
            "voice" => Some(Source::Voice),
            "audio" => Some(Source::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier shared by all records of one extraction event, based on UUIDv7
///
/// UUIDv7 keeps record ids roughly time-ordered in the ledger without any
/// coordination between concurrent pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(u128);

impl CorrelationId {
    /// Generate a new UUIDv7-based CorrelationId
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_domain::CorrelationId;
    ///
    /// let a = CorrelationId::new();
    /// let b = CorrelationId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Create a CorrelationId from a raw u128 value
    pub fn from_value(value: u128) -> Self {
        Self(value)
    }

    /// Parse a CorrelationId from its UUID string form
    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|u| Self(u.as_u128()))
            .map_err(|e| format!("Invalid correlation id: {}", e))
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Id of the record at `index` within a multi-item event
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_domain::CorrelationId;
    ///
    /// let id = CorrelationId::from_value(1);
    /// assert_eq!(id.record_id(2), "00000000-0000-0000-0000-000000000001-2");
    /// ```
    pub fn record_id(&self, index: usize) -> String {
        format!("{}-{}", self, index)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

/// One persisted expense line.
///
/// Write-once: nothing in the system updates or deletes a record.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// Correlation id, or `{correlation}-{index}` for multi-item events
    pub id: String,

    /// Platform sender id
    pub user_id: i64,

    /// When the extraction event was normalized
    pub created_at: DateTime<Utc>,

    /// Message kind the record came from
    pub source: Source,

    /// Original message text, if the source was text
    pub raw_text: Option<String>,

    /// Event total (shared by every record of the event)
    pub spend_total: f64,

    /// Currency code
    pub currency: String,

    /// Line item name
    pub item_name: String,

    /// Line item price
    pub item_price: f64,

    /// Cashier name (may be empty)
    pub cashier_name: String,

    /// Serialized ExtractionResult of the event
    pub json: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trip() {
        for source in [Source::Text, Source::Photo, Source::Voice, Source::Audio] {
            assert_eq!(Source::parse(source.as_str()), Some(source));
        }
        assert_eq!(Source::parse("PHOTO"), Some(Source::Photo));
        assert_eq!(Source::parse("video"), None);
    }

    #[test]
    fn test_correlation_id_display_and_parse() {
        let id = CorrelationId::new();
        let id_str = id.to_string();

        // 8-4-4-4-12 with hyphens
        assert_eq!(id_str.len(), 36);
        assert_eq!(CorrelationId::from_string(&id_str).unwrap(), id);
    }

    #[test]
    fn test_correlation_id_invalid_string() {
        assert!(CorrelationId::from_string("not-a-valid-uuid").is_err());
        assert!(CorrelationId::from_string("").is_err());
    }

    #[test]
    fn test_record_id_keeps_prefix() {
        let id = CorrelationId::new();
        let record_id = id.record_id(3);
        assert!(record_id.starts_with(&id.to_string()));
        assert!(record_id.ends_with("-3"));
    }
}
