//! Fans one image out to the selected providers and collects every result.
//!
//! Each provider call runs in its own task. A provider that fails, panics or
//! overruns its deadline yields an error result for that provider only; the
//! others are always collected.

use crate::config::{AnalysisPolicy, Config};
use crate::image::{ImageFetcher, ImageInput};
use crate::models::{AnalysisError, AnalysisReport, AnalysisResult, ProviderId};
use crate::normalize::Normalizer;
use crate::providers::{build_analyzers, http_client, ImageAnalyzer, ProviderOutcome};
use crate::{Error, Result};
use chrono::Utc;
use futures::future::join_all;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub struct Orchestrator {
    analyzers: BTreeMap<ProviderId, Arc<dyn ImageAnalyzer>>,
    normalizer: Normalizer,
    policy: AnalysisPolicy,
    fetcher: ImageFetcher,
}

impl Orchestrator {
    /// An orchestrator with no providers registered.
    pub fn new(policy: AnalysisPolicy) -> Self {
        Self {
            analyzers: BTreeMap::new(),
            normalizer: Normalizer::new(&policy),
            policy,
            fetcher: ImageFetcher::new(reqwest::Client::new()),
        }
    }

    /// Register every provider client built from startup configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = http_client(&config.policy)?;

        let orchestrator = build_analyzers(config, http.clone()).into_iter().fold(
            Self::new(config.policy.clone()),
            |orchestrator, analyzer| orchestrator.with_analyzer(analyzer),
        );
        Ok(orchestrator.with_fetcher(ImageFetcher::new(http)))
    }

    /// Register (or replace) the analyzer for its provider id.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.analyzers.insert(analyzer.id(), analyzer);
        self
    }

    pub fn with_fetcher(mut self, fetcher: ImageFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.analyzers.keys().copied().collect()
    }

    /// Analyse `image` with every selected provider concurrently.
    ///
    /// Only an empty selection is an error; provider failures are returned as
    /// results carrying `error`.
    pub async fn run(
        &self,
        image: &ImageInput,
        selected: &BTreeSet<ProviderId>,
    ) -> Result<BTreeMap<ProviderId, AnalysisResult>> {
        if selected.is_empty() {
            return Err(Error::NoProvidersSelected);
        }

        let image = Arc::new(image.clone());
        let mut results = BTreeMap::new();
        let mut providers = Vec::new();
        let mut handles = Vec::new();

        for &provider in selected {
            let Some(analyzer) = self.analyzers.get(&provider) else {
                warn!(provider = %provider, "Provider selected but not registered");
                results.insert(
                    provider,
                    AnalysisResult::failed(
                        provider,
                        AnalysisError::configuration(format!(
                            "{} provider is not registered",
                            provider.display_name()
                        )),
                    ),
                );
                continue;
            };

            let call = analyze_with_deadline(
                Arc::clone(analyzer),
                Arc::clone(&image),
                self.policy.provider_deadline,
            );
            providers.push(provider);
            handles.push(tokio::spawn(call.in_current_span()));
        }

        for (provider, joined) in providers.into_iter().zip(join_all(handles).await) {
            let outcome = joined.unwrap_or_else(|e| ProviderOutcome::Failure(join_failure(provider, e)));
            let result = self.normalizer.normalize(provider, outcome);
            match &result.error {
                Some(e) => warn!(provider = %provider, kind = ?e.kind, "Provider failed: {}", e),
                None => info!(provider = %provider, model = ?result.model, "Provider succeeded"),
            }
            results.insert(provider, result);
        }

        Ok(results)
    }

    /// Validate raw upload bytes and analyse them.
    pub async fn analyze_image(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        selected: &BTreeSet<ProviderId>,
    ) -> Result<AnalysisReport> {
        if selected.is_empty() {
            return Err(Error::NoProvidersSelected);
        }
        let image = ImageInput::new(bytes, mime)?;
        self.report(&image, selected).await
    }

    /// Download an image and analyse it.
    pub async fn analyze_url(
        &self,
        url: &str,
        selected: &BTreeSet<ProviderId>,
    ) -> Result<AnalysisReport> {
        if selected.is_empty() {
            return Err(Error::NoProvidersSelected);
        }
        let image = self.fetcher.fetch(url).await?;
        self.report(&image, selected).await
    }

    pub async fn report(
        &self,
        image: &ImageInput,
        selected: &BTreeSet<ProviderId>,
    ) -> Result<AnalysisReport> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let span = info_span!("analyze", request_id = %request_id);

        span.in_scope(|| {
            info!(
                mime = %image.mime(),
                bytes = image.len(),
                providers = ?selected,
                "Starting analysis"
            )
        });
        let results = self.run(image, selected).instrument(span.clone()).await?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.in_scope(|| info!(elapsed_ms, "Analysis complete"));

        Ok(AnalysisReport {
            request_id,
            completed_at: Utc::now(),
            elapsed_ms,
            results,
        })
    }
}

async fn analyze_with_deadline(
    analyzer: Arc<dyn ImageAnalyzer>,
    image: Arc<ImageInput>,
    deadline: Option<Duration>,
) -> ProviderOutcome {
    let Some(limit) = deadline else {
        return analyzer.analyze(&image).await;
    };

    match tokio::time::timeout(limit, analyzer.analyze(&image)).await {
        Ok(outcome) => outcome,
        Err(_) => ProviderOutcome::Failure(
            AnalysisError::provider(format!("{} timed out", analyzer.id().display_name()))
                .with_details(format!("No response within {:?}", limit)),
        ),
    }
}

fn join_failure(provider: ProviderId, err: JoinError) -> AnalysisError {
    let name = provider.display_name();
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        error!(provider = %provider, "Provider client panicked: {}", message);
        AnalysisError::internal(format!("{} client panicked", name)).with_details(message)
    } else {
        error!(provider = %provider, "Provider task cancelled");
        AnalysisError::internal(format!("{} call was cancelled", name))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
