//! Core pipeline: message to assets to extraction to ledger to reply

use crate::assets::SourceInput;
use crate::error::PipelineError;
use crate::normalizer::{normalize, NormalizedBatch};
use crate::summary::render_summary;
use std::fmt;
use std::sync::{Arc, Mutex};
use tally_domain::traits::{ChatPlatform, ExtractionProvider, LedgerStore};
use tally_domain::{ExtractionResult, FieldBindings, IncomingMessage, Source};
use tracing::{debug, info, warn};

/// Stages of one pipeline run. Any failure jumps straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Message accepted
    Received,
    /// Assets built and attachments fetched
    AssetsBuilt,
    /// Extraction result obtained
    Extracted,
    /// Ledger records built
    Normalized,
    /// Records committed
    Persisted,
    /// Summary delivered
    Replied,
    /// A stage failed; later stages were skipped
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// What the extraction backend produced
    pub extraction: ExtractionResult,

    /// Records written and the computed total
    pub batch: NormalizedBatch,

    /// Rendered HTML reply
    pub summary: String,
}

/// The extraction pipeline.
///
/// Holds its collaborators explicitly; clones share the provider and store.
pub struct Pipeline<P, S> {
    provider: Arc<P>,
    store: Arc<Mutex<S>>,
    bindings: FieldBindings,
}

impl<P, S> Clone for Pipeline<P, S> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
            bindings: self.bindings.clone(),
        }
    }
}

impl<P, S> Pipeline<P, S>
where
    P: ExtractionProvider,
    S: LedgerStore,
    S::Error: fmt::Display,
{
    /// Create a new pipeline
    pub fn new(provider: P, store: S, bindings: FieldBindings) -> Self {
        Self::from_shared(Arc::new(provider), Arc::new(Mutex::new(store)), bindings)
    }

    /// Create a pipeline over already shared collaborators
    pub fn from_shared(provider: Arc<P>, store: Arc<Mutex<S>>, bindings: FieldBindings) -> Self {
        Self {
            provider,
            store,
            bindings,
        }
    }

    /// Shared handle to the ledger store
    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    /// Field bindings handed to the provider
    pub fn bindings(&self) -> &FieldBindings {
        &self.bindings
    }

    /// Run every stage up to and including persistence.
    ///
    /// Nothing is written unless all earlier stages succeed. Dropping the
    /// returned future before it completes leaves the ledger untouched.
    pub async fn run<C: ChatPlatform>(
        &self,
        platform: &C,
        source: Source,
        msg: &IncomingMessage,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut stage = PipelineStage::Received;
        let outcome = self.run_stages(platform, source, msg, &mut stage).await;
        if let Err(e) = &outcome {
            warn!(
                "Pipeline failed after {} for user {} ({}): {}",
                stage, msg.sender_id, source, e
            );
        }
        outcome
    }

    async fn run_stages<C: ChatPlatform>(
        &self,
        platform: &C,
        source: Source,
        msg: &IncomingMessage,
        stage: &mut PipelineStage,
    ) -> Result<PipelineOutcome, PipelineError> {
        let input = SourceInput::from_message(source, msg)?;
        let raw_text = input.raw_text().map(str::to_string);

        let assets = input.into_assets(platform).await?;
        advance(stage, PipelineStage::AssetsBuilt);

        let extraction = self
            .provider
            .extract(&assets, &self.bindings)
            .await
            .map_err(|e| PipelineError::Extraction(e.to_string()))?;
        advance(stage, PipelineStage::Extracted);

        let batch = normalize(msg.sender_id, source, raw_text.as_deref(), &extraction)?;
        advance(stage, PipelineStage::Normalized);

        self.persist(&batch)?;
        advance(stage, PipelineStage::Persisted);

        let summary = render_summary(&extraction, batch.total);

        info!(
            "Recorded {} items ({:.2} {}) for user {} from {}",
            batch.records.len(),
            batch.total,
            extraction.currency,
            msg.sender_id,
            source
        );

        Ok(PipelineOutcome {
            extraction,
            batch,
            summary,
        })
    }

    /// Commit the batch in one transaction
    fn persist(&self, batch: &NormalizedBatch) -> Result<usize, PipelineError> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| PipelineError::Persistence(format!("Store lock error: {}", e)))?;
        store
            .insert_batch(&batch.records)
            .map_err(|e| PipelineError::Persistence(e.to_string()))
    }

    /// Run the pipeline and reply on the platform.
    ///
    /// Success sends the HTML summary; failure sends the error's plain-text
    /// explanation. Returns the final stage.
    pub async fn handle<C: ChatPlatform>(
        &self,
        platform: &C,
        source: Source,
        msg: &IncomingMessage,
    ) -> Result<PipelineStage, PipelineError> {
        let (stage, sent) = match self.run(platform, source, msg).await {
            Ok(outcome) => (
                PipelineStage::Replied,
                platform.send_html(msg.chat_id, &outcome.summary).await,
            ),
            Err(e) => (
                PipelineStage::Failed,
                platform.send_text(msg.chat_id, &e.user_message()).await,
            ),
        };

        match sent {
            Ok(()) => {
                debug!("Pipeline for chat {} ended in {}", msg.chat_id, stage);
                Ok(stage)
            }
            Err(e) => {
                warn!("Failed to reply to chat {}: {}", msg.chat_id, e);
                Err(PipelineError::Reply(e.to_string()))
            }
        }
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    debug!("Pipeline stage {} -> {}", stage, next);
    *stage = next;
}
