//! Tally Pipeline
//!
//! Turns one chat message into ledger records and a reply.
//!
//! # Architecture
//!
//! ```text
//! Message → Asset Builder → ExtractionProvider → Normalizer → LedgerStore → Summary
//! ```
//!
//! Each stage runs once per message and the first failure short-circuits the
//! rest. Persistence is a single transaction, so no failure path leaves part
//! of an event in the ledger.
//!
//! # Example Usage
//!
//! ```no_run
//! use tally_domain::{FieldBindings, IncomingMessage, Source};
//! use tally_llm::GeminiProvider;
//! use tally_llm::PromptLibrary;
//! use tally_pipeline::Pipeline;
//! use tally_store::SqliteStore;
//!
//! # async fn example<C: tally_domain::traits::ChatPlatform>(platform: C) -> Result<(), Box<dyn std::error::Error>> {
//! let provider = GeminiProvider::new("api-key", PromptLibrary::builtin());
//! let store = SqliteStore::new("spends.db")?;
//! let pipeline = Pipeline::new(provider, store, FieldBindings::default());
//!
//! let msg = IncomingMessage::text(1, 1, "Bought milk for 100 THB");
//! let outcome = pipeline.run(&platform, Source::Text, &msg).await?;
//! println!("{}", outcome.summary);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod assets;
mod error;
mod normalizer;
mod pipeline;
mod summary;

pub use assets::SourceInput;
pub use error::PipelineError;
pub use normalizer::{normalize, normalize_with, NormalizedBatch};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineStage};
pub use summary::{escape_html, render_summary};
