//! Tally Domain Layer
//!
//! Core data model and trait seams for the receipt-to-ledger pipeline.
//! Infrastructure (SQLite, the extraction backend, the chat platform) lives in
//! other crates and plugs in through the traits defined here.
//!
//! ## Key Concepts
//!
//! - **Asset**: a normalized extraction input (text or binary payload with a MIME type)
//! - **ExtractionResult**: structured output of one extraction call
//! - **LedgerRecord**: one persisted, item-level expense row
//! - **CorrelationId**: shared id prefix of all records from one extraction event
//! - **FieldBindings**: per-field prompt/model/sampling configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asset;
pub mod binding;
pub mod expense;
pub mod message;
pub mod record;
pub mod traits;

// Re-exports for convenience
pub use asset::{Asset, AssetKind, AssetPayload};
pub use binding::{BindingParseError, Field, FieldBinding, FieldBindings};
pub use expense::{ExtractionResult, Position};
pub use message::{FileRef, IncomingMessage};
pub use record::{CorrelationId, LedgerRecord, Source, UNKNOWN_ITEM};
