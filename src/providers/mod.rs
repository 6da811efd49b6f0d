//! Provider clients for the external image-analysis services
//!
//! Each client wraps exactly one vendor API, knows its own auth scheme and
//! request shape, and reports every failure as a `ProviderOutcome::Failure`
//! instead of returning an error.

pub mod clarifai;
pub(crate) mod fallback;
pub mod gemini;
pub(crate) mod http;
pub mod huggingface;
pub mod mock;
pub mod sightengine;

pub use clarifai::ClarifaiClient;
pub use gemini::GeminiClient;
pub use huggingface::HuggingFaceClient;
pub use mock::MockAnalyzer;
pub use sightengine::SightengineClient;

use crate::config::{AnalysisPolicy, Config};
use crate::image::ImageInput;
use crate::models::{AnalysisError, ProviderId};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Raw result of one provider call, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Success {
        raw: Value,
        /// Model variant that produced `raw`.
        model: String,
    },
    Failure(AnalysisError),
}

impl ProviderOutcome {
    pub fn success(raw: Value, model: impl Into<String>) -> Self {
        ProviderOutcome::Success {
            raw,
            model: model.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Success { .. })
    }
}

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Analyse one image. Never fails: errors come back as `Failure`.
    async fn analyze(&self, image: &ImageInput) -> ProviderOutcome;
}

/// HTTP client carrying the per-request timeout from `policy`.
pub fn http_client(policy: &AnalysisPolicy) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(policy.request_timeout)
        .build()?)
}

/// Build one client per provider from startup configuration.
///
/// All clients share `http`'s connection pool. Providers without credentials
/// are still registered and answer with a configuration failure.
pub fn build_analyzers(config: &Config, http: reqwest::Client) -> Vec<Arc<dyn ImageAnalyzer>> {
    vec![
        Arc::new(GeminiClient::new(
            config.gemini.clone(),
            config.policy.clone(),
            http.clone(),
        )),
        Arc::new(SightengineClient::new(
            config.sightengine.clone(),
            config.policy.clone(),
            http.clone(),
        )),
        Arc::new(ClarifaiClient::new(
            config.clarifai.clone(),
            config.policy.clone(),
            http.clone(),
        )),
        Arc::new(HuggingFaceClient::new(
            config.huggingface.clone(),
            config.policy.clone(),
            http,
        )),
    ]
}

/// Convert a transport-level error into a provider failure.
pub(crate) fn failure_from_error(provider: ProviderId, err: Error) -> AnalysisError {
    let name = provider.display_name();
    match err {
        Error::UnexpectedStatus { status, body } => {
            AnalysisError::provider(format!("{} API error: {}", name, status))
                .with_status(status)
                .with_details(http::summarize_error_body(&body))
        }
        other => AnalysisError::provider(format!("{} request failed", name))
            .with_details(other.to_string()),
    }
}

/// Configuration failure reported before any network call.
pub(crate) fn missing_credentials(provider: ProviderId, what: &str, hint: &str) -> ProviderOutcome {
    tracing::warn!(provider = %provider, "{} not configured, skipping request", what);
    ProviderOutcome::Failure(
        AnalysisError::configuration(format!(
            "{} {} not configured",
            provider.display_name(),
            what
        ))
        .with_hint(hint),
    )
}
