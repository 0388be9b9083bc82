//! Tally Extraction Provider Layer
//!
//! Implementations of the `ExtractionProvider` trait from `tally-domain`.
//!
//! # Providers
//!
//! - `MockProvider`: Deterministic mock for testing
//! - `GeminiProvider`: Gemini `generateContent` integration driven by field bindings
//!
//! # Examples
//!
//! ```
//! use tally_llm::MockProvider;
//! use tally_domain::ExtractionResult;
//!
//! let provider = MockProvider::new(ExtractionResult::default());
//! assert_eq!(provider.call_count(), 0);
//! ```

#![warn(missing_docs)]

pub mod gemini;
pub mod parser;
pub mod prompt;

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tally_domain::traits::ExtractionProvider;
use tally_domain::{Asset, ExtractionResult, FieldBindings};
use thiserror::Error;

pub use gemini::GeminiProvider;
pub use prompt::PromptLibrary;

/// Errors that can occur during extraction calls
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Response could not be turned into an extraction result
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Prompt template missing or unreadable
    #[error("Prompt template error: {0}")]
    Template(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

#[derive(Debug)]
struct MockState {
    response: Result<ExtractionResult, String>,
    delay: Option<Duration>,
    call_count: usize,
    last_assets: Vec<Asset>,
    last_bindings: Option<FieldBindings>,
}

/// Mock extraction provider for deterministic testing
///
/// Returns a pre-configured result (or error) without any network calls.
/// Clones share state, so a test can keep a handle after moving the provider
/// into a pipeline.
///
/// # Examples
///
/// ```
/// use tally_llm::MockProvider;
///
/// let provider = MockProvider::failing("backend down");
/// assert_eq!(provider.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a MockProvider that always returns `result`
    pub fn new(result: ExtractionResult) -> Self {
        Self::with_response(Ok(result))
    }

    /// Create a MockProvider that always fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_response(Err(message.into()))
    }

    fn with_response(response: Result<ExtractionResult, String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                response,
                delay: None,
                call_count: 0,
                last_assets: Vec::new(),
                last_bindings: None,
            })),
        }
    }

    /// Sleep for `delay` before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    /// Replace the configured result
    pub fn set_result(&self, result: ExtractionResult) {
        self.state().response = Ok(result);
    }

    /// Get the number of times extract was called
    pub fn call_count(&self) -> usize {
        self.state().call_count
    }

    /// Assets passed to the most recent call
    pub fn last_assets(&self) -> Vec<Asset> {
        self.state().last_assets.clone()
    }

    /// Bindings passed to the most recent call
    pub fn last_bindings(&self) -> Option<FieldBindings> {
        self.state().last_bindings.clone()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(ExtractionResult::default())
    }
}

#[async_trait]
impl ExtractionProvider for MockProvider {
    type Error = LlmError;

    async fn extract(
        &self,
        assets: &[Asset],
        bindings: &FieldBindings,
    ) -> Result<ExtractionResult, Self::Error> {
        let delay = {
            let mut state = self.state();
            state.call_count += 1;
            state.last_assets = assets.to_vec();
            state.last_bindings = Some(bindings.clone());
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state().response.clone().map_err(LlmError::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_domain::Position;

    fn receipt() -> ExtractionResult {
        ExtractionResult {
            currency: "THB".to_string(),
            spend: 0.0,
            positions: vec![Position::new("milk", 30.0)],
            cashier_name: String::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_provider_returns_result() {
        let provider = MockProvider::new(receipt());
        let result = provider
            .extract(&[Asset::text("milk 30")], &FieldBindings::default())
            .await
            .unwrap();
        assert_eq!(result, receipt());
    }

    #[tokio::test]
    async fn test_mock_provider_records_call() {
        let provider = MockProvider::new(receipt());
        assert_eq!(provider.call_count(), 0);
        assert!(provider.last_bindings().is_none());

        provider
            .extract(&[Asset::text("a"), Asset::text("b")], &FieldBindings::default())
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_assets().len(), 2);
        assert_eq!(provider.last_bindings(), Some(FieldBindings::default()));
    }

    #[tokio::test]
    async fn test_mock_provider_error() {
        let provider = MockProvider::failing("quota exceeded");
        let result = provider.extract(&[], &FieldBindings::default()).await;
        assert!(matches!(result, Err(LlmError::Other(msg)) if msg == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::default();
        let provider2 = provider1.clone();

        provider1.extract(&[], &FieldBindings::default()).await.unwrap();

        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);

        provider2.set_result(receipt());
        let result = provider1.extract(&[], &FieldBindings::default()).await.unwrap();
        assert_eq!(result.positions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_provider_delay() {
        let provider = MockProvider::default().with_delay(Duration::from_secs(30));
        let started = tokio::time::Instant::now();
        provider.extract(&[], &FieldBindings::default()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
