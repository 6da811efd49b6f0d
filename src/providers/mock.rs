use super::{ImageAnalyzer, ProviderOutcome};
use crate::image::ImageInput;
use crate::models::{AnalysisError, ProviderId};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Scripted analyzer for exercising the orchestrator without a network.
///
/// Outcomes are replayed in order and cycle once exhausted.
pub struct MockAnalyzer {
    provider: ProviderId,
    outcomes: Arc<Mutex<Vec<ProviderOutcome>>>,
    call_count: Arc<AtomicUsize>,
    delay: Option<Duration>,
    panic_message: Option<String>,
}

impl MockAnalyzer {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            outcomes: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            delay: None,
            panic_message: None,
        }
    }

    pub fn with_outcome(self, outcome: ProviderOutcome) -> Self {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
        self
    }

    pub fn with_success(self, raw: Value, model: impl Into<String>) -> Self {
        self.with_outcome(ProviderOutcome::success(raw, model))
    }

    pub fn with_failure(self, error: AnalysisError) -> Self {
        self.with_outcome(ProviderOutcome::Failure(error))
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic instead of answering, like a client with a bug.
    pub fn with_panic(mut self, message: impl Into<String>) -> Self {
        self.panic_message = Some(message.into());
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageAnalyzer for MockAnalyzer {
    fn id(&self) -> ProviderId {
        self.provider
    }

    async fn analyze(&self, _image: &ImageInput) -> ProviderOutcome {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.panic_message {
            panic!("{}", message);
        }

        let outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if outcomes.is_empty() {
            // Default mock response
            ProviderOutcome::success(Value::Object(Default::default()), "mock")
        } else {
            outcomes[(count - 1) % outcomes.len()].clone()
        }
    }
}
